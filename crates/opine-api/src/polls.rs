use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use opine_core::poll::{self, NewPoll};
use opine_types::api::{Claims, CreatePollRequest, PollResponse};

use crate::auth::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::claims_from_headers;
use crate::run_blocking;

pub async fn create_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePollRequest>,
) -> AppResult<impl IntoResponse> {
    let new_poll = NewPoll {
        title: req.title,
        description: req.description,
        options: req.options,
        allow_multiple_choices: req.allow_multiple_choices,
        expires_at: req.expires_at,
    };

    let db = state.db.clone();
    let creator = claims.sub;
    let (poll, options) = run_blocking(move || poll::create_poll(&db, creator, new_poll)).await?;

    info!("Poll {} created by {}", poll.id, claims.username);
    Ok((StatusCode::CREATED, Json(PollResponse { poll, options })))
}

pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
) -> AppResult<Json<PollResponse>> {
    let db = state.db.clone();
    let (poll, options) = run_blocking(move || poll::get_poll(&db, poll_id)).await?;
    Ok(Json(PollResponse { poll, options }))
}

pub async fn close_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(poll_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let db = state.db.clone();
    let caller = claims.sub;
    run_blocking(move || poll::close_poll(&db, poll_id, caller)).await?;

    info!("Poll {} closed by {}", poll_id, claims.username);
    Ok(Json(json!({ "closed": true })))
}

/// Destructive, so the token is checked right here rather than relying on
/// route wiring.
pub async fn delete_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let Some(claims) = claims_from_headers(&headers, &state.jwt_secret) else {
        return Err(AppError::Unauthorized);
    };

    let db = state.db.clone();
    let caller = claims.sub;
    run_blocking(move || poll::delete_poll(&db, poll_id, caller)).await?;

    info!("Poll {} deleted by {}", poll_id, claims.username);
    Ok(StatusCode::NO_CONTENT)
}
