use chrono::Utc;
use uuid::Uuid;

use opine_db::{Database, queries};
use opine_types::api::{Eligibility, EligibilityStatus};
use opine_types::identity::VoterIdentity;

use crate::error::VoteError;

/// Advisory pre-check for UIs that want to grey out the vote button.
///
/// Never treat this as a guarantee: it runs outside any write lock, so the
/// ballot writer re-validates all of it inside its own transaction.
pub fn check_eligibility(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
) -> Result<Eligibility, VoteError> {
    db.with_read(|conn| {
        let pid = poll_id.to_string();

        let Some(poll) = queries::get_poll(conn, &pid)? else {
            return Ok(denied(EligibilityStatus::NotFound));
        };
        if !poll.is_active {
            return Ok(denied(EligibilityStatus::Inactive));
        }
        if let Some(expires) = poll.expires_at_utc() {
            if expires <= Utc::now() {
                return Ok(denied(EligibilityStatus::Expired));
            }
        }

        // Single-choice polls: a prior ballot means "you may change it",
        // not "you are locked out". Multi-choice polls stay eligible here;
        // per-option duplicates are caught at write time.
        let prior = queries::ballot_count_for_identity(conn, &pid, identity)?;
        if !poll.allow_multiple_choices && prior > 0 {
            return Ok(Eligibility {
                can_vote: true,
                has_voted: true,
                status: EligibilityStatus::CanChange,
            });
        }

        Ok(Eligibility {
            can_vote: true,
            has_voted: prior > 0,
            status: EligibilityStatus::Eligible,
        })
    })
}

fn denied(status: EligibilityStatus) -> Eligibility {
    Eligibility {
        can_vote: false,
        has_voted: false,
        status,
    }
}
