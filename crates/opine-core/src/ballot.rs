use std::collections::HashSet;

use chrono::Utc;
use rusqlite::TransactionBehavior;
use uuid::Uuid;

use opine_db::{Database, models::PollRow, queries};
use opine_types::api::VoteReceipt;
use opine_types::identity::VoterIdentity;

use crate::error::{VoteError, is_unique_violation};
use crate::interest;

/// Hard cap on selections in one ballot, regardless of how many options a
/// poll defines.
pub const MAX_SELECTIONS: usize = 10;

/// Cast a ballot the way the product behaves: on a single-choice poll a
/// re-vote replaces the earlier ballot instead of failing.
pub fn cast_ballot(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
    option_ids: &[String],
) -> Result<VoteReceipt, VoteError> {
    write_ballot(db, poll_id, identity, option_ids, true)
}

/// Strict variant: any prior ballot on a single-choice poll is a conflict.
pub fn submit_ballot(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
    option_ids: &[String],
) -> Result<VoteReceipt, VoteError> {
    write_ballot(db, poll_id, identity, option_ids, false)
}

fn write_ballot(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
    option_ids: &[String],
    replace_existing: bool,
) -> Result<VoteReceipt, VoteError> {
    let selections = validate_selections(option_ids)?;

    db.with_write(|conn| {
        // Immediate transaction: take the write lock up front so every
        // check below sees the state the insert will see.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pid = poll_id.to_string();

        let poll = queries::get_poll(&tx, &pid)?.ok_or(VoteError::NotFound("poll"))?;
        ensure_votable(&poll)?;

        if !poll.allow_multiple_choices && selections.len() > 1 {
            return Err(VoteError::Validation(
                "this poll accepts a single option".into(),
            ));
        }

        let sel_ids: Vec<String> = selections.iter().map(Uuid::to_string).collect();
        if queries::count_options_matching(&tx, &pid, &sel_ids)? != sel_ids.len() {
            return Err(VoteError::Validation(
                "one or more options do not belong to this poll".into(),
            ));
        }

        if poll.allow_multiple_choices {
            // A voter may add options across submissions; only repeating an
            // option they already hold is a conflict.
            if let Some(option) = queries::ballot_for_any_option(&tx, &pid, identity, &sel_ids)? {
                return Err(VoteError::Conflict(format!(
                    "a ballot for option {option} already exists"
                )));
            }
        } else if queries::ballot_count_for_identity(&tx, &pid, identity)? > 0 {
            if replace_existing {
                // Supersede, never stack: the old ballot goes away in the
                // same transaction that writes the new one.
                queries::delete_ballots_for_identity(&tx, &pid, identity)?;
            } else {
                return Err(VoteError::Conflict(
                    "a ballot was already cast on this poll".into(),
                ));
            }
        }

        for option_id in &sel_ids {
            let ballot_id = Uuid::new_v4().to_string();
            if let Err(e) = queries::insert_ballot(&tx, &ballot_id, &pid, option_id, identity) {
                // Unique index fired: a racing writer beat us to it.
                if is_unique_violation(&e) {
                    return Err(VoteError::Conflict(
                        "a ballot for this option already exists".into(),
                    ));
                }
                return Err(e.into());
            }
        }

        // Signed-in voters pick up a voter interest as part of the same
        // write; anonymous ballots leave no interest trace.
        if let VoterIdentity::Authenticated(user_id) = identity {
            interest::track_voter_interest(&tx, *user_id, poll_id)?;
        }

        let total = queries::count_ballots(&tx, &pid)?;
        tx.commit()?;

        Ok(VoteReceipt {
            poll_id,
            voted_options: selections,
            total_votes: total,
        })
    })
}

/// Remove this identity's ballot(s) from a poll. Returns how many rows went
/// away and the poll's remaining ballot count.
pub fn retract_ballot(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
) -> Result<(usize, i64), VoteError> {
    db.with_write(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pid = poll_id.to_string();

        let poll = queries::get_poll(&tx, &pid)?.ok_or(VoteError::NotFound("poll"))?;
        ensure_votable(&poll)?;

        let removed = queries::delete_ballots_for_identity(&tx, &pid, identity)?;
        if removed == 0 {
            return Err(VoteError::NotFound("ballot"));
        }

        let total = queries::count_ballots(&tx, &pid)?;
        tx.commit()?;
        Ok((removed, total))
    })
}

fn ensure_votable(poll: &PollRow) -> Result<(), VoteError> {
    if !poll.is_active {
        return Err(VoteError::Inactive);
    }
    if let Some(expires) = poll.expires_at_utc() {
        if expires <= Utc::now() {
            return Err(VoteError::Expired);
        }
    }
    Ok(())
}

/// Parse, dedup and cap the requested option ids. Repeats within one
/// request collapse silently; garbage ids are the caller's problem.
fn validate_selections(option_ids: &[String]) -> Result<Vec<Uuid>, VoteError> {
    if option_ids.is_empty() {
        return Err(VoteError::Validation("select at least one option".into()));
    }
    if option_ids.len() > MAX_SELECTIONS {
        return Err(VoteError::Validation(format!(
            "at most {MAX_SELECTIONS} options per ballot"
        )));
    }

    let mut seen = HashSet::new();
    let mut selections = Vec::with_capacity(option_ids.len());
    for raw in option_ids {
        let id = raw
            .trim()
            .parse::<Uuid>()
            .map_err(|_| VoteError::Validation(format!("invalid option id {raw:?}")))?;
        if seen.insert(id) {
            selections.push(id);
        }
    }
    Ok(selections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll_row(is_active: bool, expires_at: Option<&str>) -> PollRow {
        PollRow {
            id: Uuid::new_v4().to_string(),
            title: "test".into(),
            description: None,
            creator_id: Uuid::new_v4().to_string(),
            is_active,
            allow_multiple_choices: false,
            expires_at: expires_at.map(String::from),
            created_at: "2026-01-01 00:00:00".into(),
            updated_at: "2026-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn closed_poll_is_not_votable() {
        assert!(matches!(
            ensure_votable(&poll_row(false, None)),
            Err(VoteError::Inactive)
        ));
    }

    #[test]
    fn past_expiry_is_not_votable() {
        assert!(matches!(
            ensure_votable(&poll_row(true, Some("2020-01-01 00:00:00"))),
            Err(VoteError::Expired)
        ));
    }

    #[test]
    fn open_poll_without_expiry_is_votable() {
        assert!(ensure_votable(&poll_row(true, None)).is_ok());
    }

    #[test]
    fn selections_deduplicate() {
        let id = Uuid::new_v4().to_string();
        let parsed = validate_selections(&[id.clone(), id.clone()]).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn empty_selection_rejected() {
        assert!(matches!(
            validate_selections(&[]),
            Err(VoteError::Validation(_))
        ));
    }

    #[test]
    fn oversized_selection_rejected() {
        let ids: Vec<String> = (0..MAX_SELECTIONS + 1)
            .map(|_| Uuid::new_v4().to_string())
            .collect();
        assert!(matches!(
            validate_selections(&ids),
            Err(VoteError::Validation(_))
        ));
    }

    #[test]
    fn garbage_option_id_rejected() {
        assert!(matches!(
            validate_selections(&["not-a-uuid".into()]),
            Err(VoteError::Validation(_))
        ));
    }
}
