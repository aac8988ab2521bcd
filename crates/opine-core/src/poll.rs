use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use opine_db::models::format_utc;
use opine_db::{Database, queries};
use opine_types::models::{Poll, PollOption};

use crate::error::VoteError;
use crate::interest;

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 20;
const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 2000;
const MAX_OPTION_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    pub allow_multiple_choices: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create the poll, its options and the creator's interest row in one
/// transaction. A poll with zero persisted options must never be
/// observable, so any failed insert rolls the whole thing back.
pub fn create_poll(
    db: &Database,
    creator_id: Uuid,
    new_poll: NewPoll,
) -> Result<(Poll, Vec<PollOption>), VoteError> {
    let title = new_poll.title.trim().to_string();
    if title.is_empty() || title.len() > MAX_TITLE_LEN {
        return Err(VoteError::Validation(format!(
            "title must be 1-{MAX_TITLE_LEN} characters"
        )));
    }

    let description = match new_poll.description {
        Some(d) => {
            let d = d.trim().to_string();
            if d.len() > MAX_DESCRIPTION_LEN {
                return Err(VoteError::Validation(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters"
                )));
            }
            if d.is_empty() { None } else { Some(d) }
        }
        None => None,
    };

    let options: Vec<String> = new_poll
        .options
        .iter()
        .map(|o| o.trim().to_string())
        .collect();
    if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
        return Err(VoteError::Validation(format!(
            "a poll needs {MIN_OPTIONS}-{MAX_OPTIONS} options"
        )));
    }
    if options.iter().any(|o| o.is_empty() || o.len() > MAX_OPTION_LEN) {
        return Err(VoteError::Validation(format!(
            "each option must be 1-{MAX_OPTION_LEN} characters"
        )));
    }

    if let Some(expires) = new_poll.expires_at {
        if expires <= Utc::now() {
            return Err(VoteError::Validation("expiry must be in the future".into()));
        }
    }

    db.with_write(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let poll_id = Uuid::new_v4();
        let pid = poll_id.to_string();

        queries::insert_poll(
            &tx,
            &pid,
            &title,
            description.as_deref(),
            &creator_id.to_string(),
            new_poll.allow_multiple_choices,
            new_poll.expires_at.map(format_utc).as_deref(),
        )?;
        for (index, text) in options.iter().enumerate() {
            queries::insert_option(&tx, &Uuid::new_v4().to_string(), &pid, text, index as i64)?;
        }
        interest::track_creator_interest(&tx, creator_id, poll_id)?;
        tx.commit()?;

        read_poll(conn, poll_id)
    })
}

pub fn get_poll(db: &Database, poll_id: Uuid) -> Result<(Poll, Vec<PollOption>), VoteError> {
    db.with_read(|conn| read_poll(conn, poll_id))
}

fn read_poll(conn: &Connection, poll_id: Uuid) -> Result<(Poll, Vec<PollOption>), VoteError> {
    let pid = poll_id.to_string();
    let row = queries::get_poll(conn, &pid)?.ok_or(VoteError::NotFound("poll"))?;
    let options = queries::poll_options(conn, &pid)?;
    Ok((
        row.to_poll(),
        options.iter().map(|o| o.to_option()).collect(),
    ))
}

/// Stop voting early. Owner only; the poll stays readable.
pub fn close_poll(db: &Database, poll_id: Uuid, user_id: Uuid) -> Result<(), VoteError> {
    db.with_write(|conn| {
        let pid = poll_id.to_string();
        let poll = queries::get_poll(conn, &pid)?.ok_or(VoteError::NotFound("poll"))?;
        if poll.creator_id != user_id.to_string() {
            return Err(VoteError::Forbidden("only the poll owner can close it"));
        }
        if !poll.is_active {
            return Err(VoteError::Conflict("poll is already closed".into()));
        }
        queries::close_poll(conn, &pid)?;
        Ok(())
    })
}

/// Delete a poll and everything referencing it. Owner only. Children go
/// first so no foreign key ever dangles, and the transaction makes the
/// cascade all-or-nothing.
pub fn delete_poll(db: &Database, poll_id: Uuid, user_id: Uuid) -> Result<(), VoteError> {
    db.with_write(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pid = poll_id.to_string();

        let poll = queries::get_poll(&tx, &pid)?.ok_or(VoteError::NotFound("poll"))?;
        if poll.creator_id != user_id.to_string() {
            return Err(VoteError::Forbidden("only the poll owner can delete it"));
        }

        queries::delete_poll_graph(&tx, &pid)?;
        tx.commit()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opine_types::models::InterestType;

    fn db_with_user() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "creator", "creator@example.com", "hash")
            .unwrap();
        (db, user_id)
    }

    fn basic_poll(options: &[&str]) -> NewPoll {
        NewPoll {
            title: "Where should we eat?".into(),
            description: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            allow_multiple_choices: false,
            expires_at: None,
        }
    }

    #[test]
    fn rejects_fewer_than_two_options() {
        let (db, user) = db_with_user();
        let result = create_poll(&db, user, basic_poll(&["only one"]));
        assert!(matches!(result, Err(VoteError::Validation(_))));
    }

    #[test]
    fn rejects_blank_title() {
        let (db, user) = db_with_user();
        let mut poll = basic_poll(&["a", "b"]);
        poll.title = "   ".into();
        assert!(matches!(
            create_poll(&db, user, poll),
            Err(VoteError::Validation(_))
        ));
    }

    #[test]
    fn rejects_past_expiry() {
        let (db, user) = db_with_user();
        let mut poll = basic_poll(&["a", "b"]);
        poll.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(matches!(
            create_poll(&db, user, poll),
            Err(VoteError::Validation(_))
        ));
    }

    #[test]
    fn creation_writes_options_and_creator_interest() {
        let (db, user) = db_with_user();
        let (poll, options) = create_poll(&db, user, basic_poll(&["tacos", "sushi"])).unwrap();

        assert_eq!(poll.creator_id, user);
        assert!(poll.is_active);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].order_index, 0);
        assert_eq!(options[1].order_index, 1);

        let types = db
            .with_read::<_, _, anyhow::Error>(|conn| {
                queries::interest_types_for(conn, &user.to_string(), &poll.id.to_string())
            })
            .unwrap();
        assert_eq!(types, vec![InterestType::Creator.as_str().to_string()]);
    }

    #[test]
    fn owner_check_guards_close_and_delete() {
        let (db, owner) = db_with_user();
        let stranger = Uuid::new_v4();
        db.create_user(&stranger.to_string(), "stranger", "s@example.com", "hash")
            .unwrap();
        let (poll, _) = create_poll(&db, owner, basic_poll(&["a", "b"])).unwrap();

        assert!(matches!(
            close_poll(&db, poll.id, stranger),
            Err(VoteError::Forbidden(_))
        ));
        assert!(matches!(
            delete_poll(&db, poll.id, stranger),
            Err(VoteError::Forbidden(_))
        ));

        close_poll(&db, poll.id, owner).unwrap();
        let (closed, _) = get_poll(&db, poll.id).unwrap();
        assert!(!closed.is_active);

        delete_poll(&db, poll.id, owner).unwrap();
        assert!(matches!(
            get_poll(&db, poll.id),
            Err(VoteError::NotFound(_))
        ));
    }
}
