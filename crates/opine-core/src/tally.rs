use uuid::Uuid;

use opine_db::{Database, queries};
use opine_types::api::{OptionTally, PollResults};

use crate::error::VoteError;

/// Per-option counts and the poll total, straight from committed ballot
/// rows. `total_votes` counts ballot rows, so a multi-choice voter
/// contributes once per selected option. Every row belongs to exactly one
/// option, which makes the total the sum of the per-option counts and lets
/// one grouped query produce a consistent snapshot.
pub fn get_results(db: &Database, poll_id: Uuid) -> Result<PollResults, VoteError> {
    db.with_read(|conn| {
        let pid = poll_id.to_string();
        if queries::get_poll(conn, &pid)?.is_none() {
            return Err(VoteError::NotFound("poll"));
        }

        let tallies = queries::option_tallies(conn, &pid)?;
        let total_votes: i64 = tallies.iter().map(|(_, count)| *count).sum();

        let options = tallies
            .into_iter()
            .map(|(row, count)| {
                let option = row.to_option();
                OptionTally {
                    option_id: option.id,
                    text: option.text,
                    count,
                    percentage: if total_votes == 0 {
                        0.0
                    } else {
                        count as f64 / total_votes as f64 * 100.0
                    },
                }
            })
            .collect();

        Ok(PollResults {
            poll_id,
            options,
            total_votes,
        })
    })
}
