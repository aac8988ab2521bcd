use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, ToSql, params};

use opine_types::identity::VoterIdentity;

use crate::Database;
use crate::models::{OptionRow, PollRow, UserRow};

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_poll(row: &rusqlite::Row<'_>) -> rusqlite::Result<PollRow> {
    Ok(PollRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        is_active: row.get(4)?,
        allow_multiple_choices: row.get(5)?,
        expires_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn map_option(row: &rusqlite::Row<'_>) -> rusqlite::Result<OptionRow> {
    Ok(OptionRow {
        id: row.get(0)?,
        poll_id: row.get(1)?,
        text: row.get(2)?,
        order_index: row.get(3)?,
    })
}

/// Which ballot column scopes this identity, and the value stored there.
fn identity_column(identity: &VoterIdentity) -> (&'static str, String) {
    match identity {
        VoterIdentity::Authenticated(id) => ("user_id", id.to_string()),
        VoterIdentity::Anonymous { ip, .. } => ("ip_address", ip.to_string()),
    }
}

const POLL_COLUMNS: &str = "id, title, description, creator_id, is_active, \
                            allow_multiple_choices, expires_at, created_at, updated_at";

// -- Users --

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_write(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password) VALUES (?1, ?2, ?3, ?4)",
                params![id, username, email, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_read(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, email, password, created_at
                     FROM users WHERE username = ?1",
                    params![username],
                    map_user,
                )
                .optional()?;
            Ok(user)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_read(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, email, password, created_at
                     FROM users WHERE email = ?1",
                    params![email],
                    map_user,
                )
                .optional()?;
            Ok(user)
        })
    }
}

// -- Polls --

pub fn insert_poll(
    conn: &Connection,
    id: &str,
    title: &str,
    description: Option<&str>,
    creator_id: &str,
    allow_multiple_choices: bool,
    expires_at: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO polls (id, title, description, creator_id, allow_multiple_choices, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, title, description, creator_id, allow_multiple_choices, expires_at],
    )?;
    Ok(())
}

pub fn get_poll(conn: &Connection, poll_id: &str) -> Result<Option<PollRow>> {
    let poll = conn
        .query_row(
            &format!("SELECT {POLL_COLUMNS} FROM polls WHERE id = ?1"),
            params![poll_id],
            map_poll,
        )
        .optional()?;
    Ok(poll)
}

pub fn close_poll(conn: &Connection, poll_id: &str) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE polls SET is_active = 0, updated_at = datetime('now') WHERE id = ?1",
        params![poll_id],
    )?;
    Ok(updated)
}

/// Delete a poll and everything hanging off it. Order matters: children
/// first so the foreign keys never dangle mid-way.
pub fn delete_poll_graph(conn: &Connection, poll_id: &str) -> Result<()> {
    conn.execute("DELETE FROM ballots WHERE poll_id = ?1", params![poll_id])?;
    conn.execute("DELETE FROM interests WHERE poll_id = ?1", params![poll_id])?;
    conn.execute(
        "DELETE FROM notifications WHERE poll_id = ?1",
        params![poll_id],
    )?;
    conn.execute("DELETE FROM options WHERE poll_id = ?1", params![poll_id])?;
    conn.execute("DELETE FROM polls WHERE id = ?1", params![poll_id])?;
    Ok(())
}

// -- Options --

pub fn insert_option(
    conn: &Connection,
    id: &str,
    poll_id: &str,
    text: &str,
    order_index: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO options (id, poll_id, text, order_index) VALUES (?1, ?2, ?3, ?4)",
        params![id, poll_id, text, order_index],
    )?;
    Ok(())
}

pub fn poll_options(conn: &Connection, poll_id: &str) -> Result<Vec<OptionRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, poll_id, text, order_index FROM options
         WHERE poll_id = ?1 ORDER BY order_index",
    )?;
    let options = stmt
        .query_map(params![poll_id], map_option)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(options)
}

/// How many of the given option ids actually belong to this poll.
pub fn count_options_matching(
    conn: &Connection,
    poll_id: &str,
    option_ids: &[String],
) -> Result<usize> {
    if option_ids.is_empty() {
        return Ok(0);
    }
    let placeholders: Vec<String> = (0..option_ids.len())
        .map(|i| format!("?{}", i + 2))
        .collect();
    let sql = format!(
        "SELECT COUNT(*) FROM options WHERE poll_id = ?1 AND id IN ({})",
        placeholders.join(", ")
    );
    let mut bind: Vec<&dyn ToSql> = Vec::with_capacity(option_ids.len() + 1);
    bind.push(&poll_id);
    for id in option_ids {
        bind.push(id);
    }
    let count: i64 = conn.query_row(&sql, bind.as_slice(), |row| row.get(0))?;
    Ok(count as usize)
}

// -- Ballots --

pub fn insert_ballot(
    conn: &Connection,
    id: &str,
    poll_id: &str,
    option_id: &str,
    identity: &VoterIdentity,
) -> Result<()> {
    match identity {
        VoterIdentity::Authenticated(user_id) => {
            conn.execute(
                "INSERT INTO ballots (id, poll_id, option_id, user_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, poll_id, option_id, user_id.to_string()],
            )?;
        }
        VoterIdentity::Anonymous { ip, fingerprint } => {
            conn.execute(
                "INSERT INTO ballots (id, poll_id, option_id, ip_address, fingerprint)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, poll_id, option_id, ip.to_string(), fingerprint],
            )?;
        }
    }
    Ok(())
}

pub fn ballot_count_for_identity(
    conn: &Connection,
    poll_id: &str,
    identity: &VoterIdentity,
) -> Result<i64> {
    let (column, value) = identity_column(identity);
    let count = conn.query_row(
        &format!("SELECT COUNT(*) FROM ballots WHERE poll_id = ?1 AND {column} = ?2"),
        params![poll_id, value],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// First of the given options this identity already holds a ballot for,
/// if any.
pub fn ballot_for_any_option(
    conn: &Connection,
    poll_id: &str,
    identity: &VoterIdentity,
    option_ids: &[String],
) -> Result<Option<String>> {
    if option_ids.is_empty() {
        return Ok(None);
    }
    let (column, value) = identity_column(identity);
    let placeholders: Vec<String> = (0..option_ids.len())
        .map(|i| format!("?{}", i + 3))
        .collect();
    let sql = format!(
        "SELECT option_id FROM ballots
         WHERE poll_id = ?1 AND {column} = ?2 AND option_id IN ({})
         LIMIT 1",
        placeholders.join(", ")
    );
    let mut bind: Vec<&dyn ToSql> = Vec::with_capacity(option_ids.len() + 2);
    bind.push(&poll_id);
    bind.push(&value);
    for id in option_ids {
        bind.push(id);
    }
    let hit = conn
        .query_row(&sql, bind.as_slice(), |row| row.get(0))
        .optional()?;
    Ok(hit)
}

pub fn delete_ballots_for_identity(
    conn: &Connection,
    poll_id: &str,
    identity: &VoterIdentity,
) -> Result<usize> {
    let (column, value) = identity_column(identity);
    let deleted = conn.execute(
        &format!("DELETE FROM ballots WHERE poll_id = ?1 AND {column} = ?2"),
        params![poll_id, value],
    )?;
    Ok(deleted)
}

pub fn count_ballots(conn: &Connection, poll_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM ballots WHERE poll_id = ?1",
        params![poll_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// -- Tallies --

/// Per-option ballot counts, zero-count options included.
pub fn option_tallies(conn: &Connection, poll_id: &str) -> Result<Vec<(OptionRow, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT o.id, o.poll_id, o.text, o.order_index, COUNT(b.id)
         FROM options o
         LEFT JOIN ballots b ON b.option_id = o.id
         WHERE o.poll_id = ?1
         GROUP BY o.id
         ORDER BY o.order_index",
    )?;
    let tallies = stmt
        .query_map(params![poll_id], |row| Ok((map_option(row)?, row.get(4)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tallies)
}

// -- Interests --

pub fn interest_types_for(conn: &Connection, user_id: &str, poll_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT interest_type FROM interests WHERE user_id = ?1 AND poll_id = ?2",
    )?;
    let types = stmt
        .query_map(params![user_id, poll_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(types)
}

pub fn upsert_interest(
    conn: &Connection,
    user_id: &str,
    poll_id: &str,
    interest_type: &str,
    notifications_enabled: bool,
) -> Result<()> {
    conn.execute(
        "INSERT INTO interests (user_id, poll_id, interest_type, notifications_enabled)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_id, poll_id, interest_type)
         DO UPDATE SET notifications_enabled = excluded.notifications_enabled,
                       updated_at = datetime('now')",
        params![user_id, poll_id, interest_type, notifications_enabled],
    )?;
    Ok(())
}

pub fn delete_interest(
    conn: &Connection,
    user_id: &str,
    poll_id: &str,
    interest_type: &str,
) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM interests
         WHERE user_id = ?1 AND poll_id = ?2 AND interest_type = ?3",
        params![user_id, poll_id, interest_type],
    )?;
    Ok(deleted)
}

/// Mute every interest row the user holds for this poll, keeping the rows.
pub fn disable_notifications(conn: &Connection, user_id: &str, poll_id: &str) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE interests SET notifications_enabled = 0, updated_at = datetime('now')
         WHERE user_id = ?1 AND poll_id = ?2",
        params![user_id, poll_id],
    )?;
    Ok(updated)
}

/// Users to email about a poll: anyone holding an interest row with
/// notifications still on. Distinct, since creator and voter rows may
/// coexist for the same user.
pub fn subscribed_users(conn: &Connection, poll_id: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT i.user_id, u.email
         FROM interests i
         JOIN users u ON u.id = i.user_id
         WHERE i.poll_id = ?1 AND i.notifications_enabled = 1",
    )?;
    let users = stmt
        .query_map(params![poll_id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

// -- Notifications --

pub fn notification_exists(
    conn: &Connection,
    user_id: &str,
    poll_id: &str,
    kind: &str,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND poll_id = ?2 AND kind = ?3",
        params![user_id, poll_id, kind],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_notification(
    conn: &Connection,
    user_id: &str,
    poll_id: &str,
    kind: &str,
    message_id: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (user_id, poll_id, kind, message_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![user_id, poll_id, kind, message_id],
    )?;
    Ok(())
}

// -- Sweep --

pub fn polls_expiring_within(conn: &Connection, hours: i64) -> Result<Vec<PollRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POLL_COLUMNS} FROM polls
         WHERE is_active = 1
           AND expires_at IS NOT NULL
           AND expires_at > datetime('now')
           AND expires_at <= datetime('now', '+' || ?1 || ' hours')"
    ))?;
    let polls = stmt
        .query_map(params![hours], map_poll)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(polls)
}

pub fn polls_expired_within(conn: &Connection, hours_back: i64) -> Result<Vec<PollRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {POLL_COLUMNS} FROM polls
         WHERE is_active = 1
           AND expires_at IS NOT NULL
           AND expires_at <= datetime('now')
           AND expires_at >= datetime('now', '-' || ?1 || ' hours')"
    ))?;
    let polls = stmt
        .query_map(params![hours_back], map_poll)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(polls)
}

// -- Rate limits --

/// Bump the fixed-window counter for a bucket and return the new count.
/// Single statement, so two racing requests can never read the same value.
pub fn bump_rate_counter(conn: &Connection, bucket: &str, window_start: i64) -> Result<i64> {
    let count = conn.query_row(
        "INSERT INTO rate_limits (bucket, window_start, count) VALUES (?1, ?2, 1)
         ON CONFLICT (bucket, window_start) DO UPDATE SET count = count + 1
         RETURNING count",
        params![bucket, window_start],
        |row| row.get(0),
    )?;
    Ok(count)
}

pub fn prune_rate_windows(conn: &Connection, older_than: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM rate_limits WHERE window_start < ?1",
        params![older_than],
    )?;
    Ok(deleted)
}
