use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use opine_db::{Database, queries};
use opine_types::identity::VoterIdentity;
use opine_types::models::InterestType;

use crate::error::VoteError;

/// Outcome of presenting a new interest claim to the precedence rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestAction {
    /// Write the row, or refresh `notifications_enabled` if it exists.
    Upsert,
    /// Leave every existing row untouched.
    Skip,
}

/// Outcome of an unfollow, given the rows that exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfollowAction {
    /// Pure follower: the relationship ends, the row goes away.
    Delete,
    /// Creator or voter stake coexists: rows stay, notifications stop.
    Mute,
    /// Nothing to unfollow.
    Missing,
}

/// Precedence over the set of interest types a user already holds for a
/// poll. Creator and follower claims always land (the upsert refreshes
/// `notifications_enabled`). A voter claim is strictly additive: it only
/// lands on an empty slate, so voting never touches a creator or follower
/// row.
pub fn decide(existing: &[InterestType], incoming: InterestType) -> InterestAction {
    match incoming {
        InterestType::Voter if !existing.is_empty() => InterestAction::Skip,
        _ => InterestAction::Upsert,
    }
}

pub fn decide_unfollow(existing: &[InterestType]) -> UnfollowAction {
    if existing.is_empty() {
        UnfollowAction::Missing
    } else if existing.iter().all(|t| *t == InterestType::Follower) {
        UnfollowAction::Delete
    } else {
        UnfollowAction::Mute
    }
}

/// Record the creator stake. Runs inside the poll-creation transaction.
pub fn track_creator_interest(
    conn: &Connection,
    user_id: Uuid,
    poll_id: Uuid,
) -> Result<(), VoteError> {
    apply(conn, user_id, poll_id, InterestType::Creator)
}

/// Record a voter stake alongside a ballot write, in the same transaction.
pub fn track_voter_interest(
    conn: &Connection,
    user_id: Uuid,
    poll_id: Uuid,
) -> Result<(), VoteError> {
    apply(conn, user_id, poll_id, InterestType::Voter)
}

fn apply(
    conn: &Connection,
    user_id: Uuid,
    poll_id: Uuid,
    incoming: InterestType,
) -> Result<(), VoteError> {
    let uid = user_id.to_string();
    let pid = poll_id.to_string();
    match decide(&load_types(conn, &uid, &pid)?, incoming) {
        InterestAction::Skip => Ok(()),
        InterestAction::Upsert => {
            queries::upsert_interest(conn, &uid, &pid, incoming.as_str(), true)?;
            Ok(())
        }
    }
}

/// Explicit follow. Only signed-in users can hold durable interest.
pub fn follow_poll(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
) -> Result<(), VoteError> {
    let Some(user_id) = identity.user_id() else {
        return Err(VoteError::AuthRequired);
    };
    db.with_write(|conn| {
        let pid = poll_id.to_string();
        if queries::get_poll(conn, &pid)?.is_none() {
            return Err(VoteError::NotFound("poll"));
        }
        apply(conn, user_id, poll_id, InterestType::Follower)
    })
}

pub fn unfollow_poll(
    db: &Database,
    poll_id: Uuid,
    identity: &VoterIdentity,
) -> Result<(), VoteError> {
    let Some(user_id) = identity.user_id() else {
        return Err(VoteError::AuthRequired);
    };
    db.with_write(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let uid = user_id.to_string();
        let pid = poll_id.to_string();

        if queries::get_poll(&tx, &pid)?.is_none() {
            return Err(VoteError::NotFound("poll"));
        }

        match decide_unfollow(&load_types(&tx, &uid, &pid)?) {
            UnfollowAction::Missing => return Err(VoteError::NotFound("follow")),
            UnfollowAction::Delete => {
                queries::delete_interest(&tx, &uid, &pid, InterestType::Follower.as_str())?;
            }
            UnfollowAction::Mute => {
                queries::disable_notifications(&tx, &uid, &pid)?;
            }
        }

        tx.commit()?;
        Ok(())
    })
}

fn load_types(
    conn: &Connection,
    user_id: &str,
    poll_id: &str,
) -> Result<Vec<InterestType>, VoteError> {
    let raw = queries::interest_types_for(conn, user_id, poll_id)?;
    Ok(raw.iter().filter_map(|s| InterestType::from_str(s)).collect())
}
