use uuid::Uuid;

use opine_db::{Database, queries};
use opine_types::models::NotificationKind;

use crate::error::{VoteError, is_unique_violation};

/// Result of writing to the dedup ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    /// First record for this (user, poll, kind).
    Fresh,
    /// Another writer got there first. Not an error; the email must not go
    /// out again.
    AlreadySent,
}

/// Ledger lookup. Row presence is the only source of truth for "already
/// notified".
pub fn was_notified(
    db: &Database,
    user_id: Uuid,
    poll_id: Uuid,
    kind: NotificationKind,
) -> Result<bool, VoteError> {
    db.with_read(|conn| {
        Ok(queries::notification_exists(
            conn,
            &user_id.to_string(),
            &poll_id.to_string(),
            kind.as_str(),
        )?)
    })
}

/// Record a sent notification. The unique constraint on (user, poll, kind)
/// is the actual guard: a duplicate insert reports `AlreadySent` rather
/// than erroring, so two racing schedulers fail closed.
pub fn record_notified(
    db: &Database,
    user_id: Uuid,
    poll_id: Uuid,
    kind: NotificationKind,
    provider_message_id: &str,
) -> Result<Recorded, VoteError> {
    db.with_write(|conn| {
        match queries::insert_notification(
            conn,
            &user_id.to_string(),
            &poll_id.to_string(),
            kind.as_str(),
            provider_message_id,
        ) {
            Ok(()) => Ok(Recorded::Fresh),
            Err(e) if is_unique_violation(&e) => Ok(Recorded::AlreadySent),
            Err(e) => Err(e.into()),
        }
    })
}
