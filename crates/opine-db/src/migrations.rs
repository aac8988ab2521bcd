use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Apply any schema migrations newer than what the database reports.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if version < 1 {
        info!("Applying migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE polls (
                id                      TEXT PRIMARY KEY,
                title                   TEXT NOT NULL,
                description             TEXT,
                creator_id              TEXT NOT NULL REFERENCES users(id),
                is_active               INTEGER NOT NULL DEFAULT 1,
                allow_multiple_choices  INTEGER NOT NULL DEFAULT 0,
                expires_at              TEXT,
                created_at              TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at              TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE options (
                id           TEXT PRIMARY KEY,
                poll_id      TEXT NOT NULL REFERENCES polls(id),
                text         TEXT NOT NULL,
                order_index  INTEGER NOT NULL,
                UNIQUE (poll_id, order_index)
            );

            -- Exactly one of user_id / ip_address is set. The fingerprint
            -- rides along on anonymous ballots for audit and never takes
            -- part in a uniqueness rule.
            CREATE TABLE ballots (
                id           TEXT PRIMARY KEY,
                poll_id      TEXT NOT NULL REFERENCES polls(id),
                option_id    TEXT NOT NULL REFERENCES options(id),
                user_id      TEXT,
                ip_address   TEXT,
                fingerprint  TEXT,
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                CHECK ((user_id IS NULL) <> (ip_address IS NULL))
            );

            CREATE INDEX idx_ballots_poll ON ballots (poll_id);

            -- Duplicate-vote backstop. The write transaction is the first
            -- line of defense; these indexes catch whatever races past it.
            CREATE UNIQUE INDEX idx_ballots_option_user
                ON ballots (poll_id, option_id, user_id)
                WHERE user_id IS NOT NULL;
            CREATE UNIQUE INDEX idx_ballots_option_ip
                ON ballots (poll_id, option_id, ip_address)
                WHERE ip_address IS NOT NULL;

            CREATE TABLE interests (
                user_id                TEXT NOT NULL REFERENCES users(id),
                poll_id                TEXT NOT NULL REFERENCES polls(id),
                interest_type          TEXT NOT NULL
                    CHECK (interest_type IN ('creator', 'voter', 'follower')),
                notifications_enabled  INTEGER NOT NULL DEFAULT 1,
                created_at             TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at             TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, poll_id, interest_type)
            );

            CREATE INDEX idx_interests_poll ON interests (poll_id);

            -- Notification dedup ledger: one row per (user, poll, kind).
            CREATE TABLE notifications (
                user_id     TEXT NOT NULL REFERENCES users(id),
                poll_id     TEXT NOT NULL REFERENCES polls(id),
                kind        TEXT NOT NULL,
                message_id  TEXT NOT NULL,
                sent_at     TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (user_id, poll_id, kind)
            );

            CREATE TABLE rate_limits (
                bucket        TEXT NOT NULL,
                window_start  INTEGER NOT NULL,
                count         INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (bucket, window_start)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
