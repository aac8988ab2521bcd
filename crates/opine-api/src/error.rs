use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use opine_core::VoteError;

/// Body every error response carries: a stable machine-readable code and a
/// human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Vote(#[from] VoteError),

    #[error("too many requests")]
    RateLimited,

    #[error("invalid or missing credentials")]
    Unauthorized,

    #[error("internal error")]
    Internal(anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Vote(e) => match e {
                VoteError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION", msg),
                VoteError::NotFound(what) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
                }
                VoteError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
                VoteError::Inactive => (
                    StatusCode::FORBIDDEN,
                    "POLL_CLOSED",
                    "this poll is closed".into(),
                ),
                VoteError::Expired => (
                    StatusCode::FORBIDDEN,
                    "POLL_EXPIRED",
                    "this poll has expired".into(),
                ),
                VoteError::Forbidden(msg) => {
                    (StatusCode::FORBIDDEN, "FORBIDDEN", msg.to_string())
                }
                VoteError::AuthRequired => (
                    StatusCode::UNAUTHORIZED,
                    "AUTH_REQUIRED",
                    "sign in to do this".into(),
                ),
                VoteError::Storage(err) => {
                    // Full detail to the log, nothing internal to the caller.
                    error!("Storage failure: {:#}", err);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "STORAGE",
                        "storage operation failed".into(),
                    )
                }
            },
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "too many requests, slow down".into(),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "invalid or missing credentials".into(),
            ),
            AppError::Internal(err) => {
                error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "an internal error occurred".into(),
                )
            }
        };

        (status, Json(ErrorBody { error: code, message })).into_response()
    }
}
