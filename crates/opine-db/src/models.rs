//! Database row types. Direct mappings of SQLite rows, distinct from the
//! opine-types models so the storage layer stays independent of the API
//! surface.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use opine_types::models::{Poll, PollOption};

/// Timestamps are stored as SQLite's `datetime('now')` text, always UTC.
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.format(SQLITE_DATETIME).to_string()
}

pub fn parse_utc(s: &str) -> DateTime<Utc> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, SQLITE_DATETIME) {
        return naive.and_utc();
    }
    s.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Unparseable timestamp {:?} in database: {}", s, e);
        DateTime::<Utc>::default()
    })
}

fn parse_uuid(s: &str, column: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|e| {
        warn!("Corrupt {} {:?} in database: {}", column, s, e);
        Uuid::nil()
    })
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct PollRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: String,
    pub is_active: bool,
    pub allow_multiple_choices: bool,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl PollRow {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        self.expires_at.as_deref().map(parse_utc)
    }

    pub fn to_poll(&self) -> Poll {
        Poll {
            id: parse_uuid(&self.id, "poll id"),
            title: self.title.clone(),
            description: self.description.clone(),
            creator_id: parse_uuid(&self.creator_id, "creator id"),
            is_active: self.is_active,
            allow_multiple_choices: self.allow_multiple_choices,
            expires_at: self.expires_at_utc(),
            created_at: parse_utc(&self.created_at),
            updated_at: parse_utc(&self.updated_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionRow {
    pub id: String,
    pub poll_id: String,
    pub text: String,
    pub order_index: i64,
}

impl OptionRow {
    pub fn to_option(&self) -> PollOption {
        PollOption {
            id: parse_uuid(&self.id, "option id"),
            poll_id: parse_uuid(&self.poll_id, "poll id"),
            text: self.text.clone(),
            order_index: self.order_index,
        }
    }
}
