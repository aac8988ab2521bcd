use thiserror::Error;

/// Engine failure taxonomy. Transport-free: the HTTP layer owns the mapping
/// to status codes, callers here only ever match on intent.
#[derive(Debug, Error)]
pub enum VoteError {
    /// Malformed or out-of-range input. Always correctable by the caller.
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The operation was already done: duplicate ballot, duplicate follow.
    #[error("{0}")]
    Conflict(String),

    /// Poll was closed by its owner.
    #[error("poll is closed")]
    Inactive,

    /// Poll passed its expiry timestamp.
    #[error("poll has expired")]
    Expired,

    /// Operation reserved for the poll owner.
    #[error("{0}")]
    Forbidden(&'static str),

    /// The operation needs a signed-in user.
    #[error("authentication required")]
    AuthRequired,

    /// The store failed underneath us. Message stays internal; handlers log
    /// it and return a generic body.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for VoteError {
    fn from(e: rusqlite::Error) -> Self {
        VoteError::Storage(e.into())
    }
}

/// True when SQLite reports a UNIQUE or PRIMARY KEY constraint firing,
/// i.e. the storage-level duplicate backstop caught a race.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
