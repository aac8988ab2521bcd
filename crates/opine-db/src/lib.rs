//! SQLite persistence for Opine.
//!
//! A single connection behind a mutex; WAL mode keeps reads cheap while a
//! write is in flight. Correctness under concurrent voters does not rest on
//! that mutex: every multi-step write runs in an immediate transaction and
//! the schema's unique indexes are the final backstop, so the same rules
//! hold if this is ever swapped for a pooled setup.

pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use tracing::info;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        info!("Database ready at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database with the full schema applied. Test suites only.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read-only closure against the connection. The error type is
    /// the caller's; anything SQLite-shaped converts in via `From`.
    pub fn with_read<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("database lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run a write closure. Hands out `&mut Connection` so callers can open
    /// a real transaction around multi-statement work.
    pub fn with_write<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Connection) -> Result<T, E>,
        E: From<anyhow::Error>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("database lock poisoned: {}", e))?;
        f(&mut conn)
    }
}
