//! HTTP surface for the Opine voting engine.
//!
//! Handlers stay thin: resolve the caller, hand off to opine-core on the
//! blocking pool, translate the outcome. No voting rule lives in this
//! crate.

pub mod auth;
pub mod error;
pub mod follows;
pub mod middleware;
pub mod polls;
pub mod ratelimit;
pub mod votes;

use error::{AppError, AppResult};
use opine_core::VoteError;

/// Run a synchronous engine call on the blocking pool. SQLite work must not
/// sit on the async executor.
pub(crate) async fn run_blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> Result<T, VoteError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
        .map_err(AppError::from)
}
