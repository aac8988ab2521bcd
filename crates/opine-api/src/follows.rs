use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use opine_core::interest;
use opine_types::api::Claims;
use opine_types::identity::VoterIdentity;

use crate::auth::AppState;
use crate::error::AppResult;
use crate::run_blocking;

pub async fn follow_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(poll_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let db = state.db.clone();
    let identity = VoterIdentity::Authenticated(claims.sub);
    run_blocking(move || interest::follow_poll(&db, poll_id, &identity)).await?;

    info!("User {} follows poll {}", claims.username, poll_id);
    Ok(Json(json!({ "following": true })))
}

pub async fn unfollow_poll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(poll_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let db = state.db.clone();
    let identity = VoterIdentity::Authenticated(claims.sub);
    run_blocking(move || interest::unfollow_poll(&db, poll_id, &identity)).await?;

    info!("User {} unfollowed poll {}", claims.username, poll_id);
    Ok(Json(json!({ "following": false })))
}
