use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use opine_core::identity::{RequestMeta, resolve_identity};
use opine_core::{ballot, eligibility, tally};
use opine_types::api::VoteRequest;
use opine_types::identity::VoterIdentity;

use crate::auth::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::claims_from_headers;
use crate::ratelimit;
use crate::run_blocking;

/// Resolve who is making this request: a valid JWT wins, forwarding headers
/// are the anonymous fallback.
fn identify(state: &AppState, headers: &HeaderMap) -> VoterIdentity {
    let user_id = claims_from_headers(headers, &state.jwt_secret).map(|c| c.sub);
    let meta = RequestMeta {
        forwarded_for: header_str(headers, "x-forwarded-for"),
        real_ip: header_str(headers, "x-real-ip"),
        user_agent: header_str(headers, "user-agent"),
        accept_language: header_str(headers, "accept-language"),
    };
    resolve_identity(user_id, &meta)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

pub async fn cast_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<VoteRequest>,
) -> AppResult<impl IntoResponse> {
    let identity = identify(&state, &headers);

    let bucket = format!("vote:{}", identity.key());
    let db = state.db.clone();
    let allowed = run_blocking(move || {
        ratelimit::check(
            &db,
            &bucket,
            ratelimit::VOTE_LIMIT,
            ratelimit::VOTE_WINDOW_SECS,
        )
    })
    .await?;
    if !allowed {
        return Err(AppError::RateLimited);
    }

    let db = state.db.clone();
    let caller = identity.clone();
    let receipt =
        run_blocking(move || ballot::cast_ballot(&db, poll_id, &caller, &req.option_ids)).await?;

    info!(
        "Ballot on poll {} by {} ({} option(s))",
        poll_id,
        identity.key(),
        receipt.voted_options.len()
    );
    Ok(Json(receipt))
}

pub async fn retract_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let identity = identify(&state, &headers);

    let db = state.db.clone();
    let caller = identity.clone();
    let (removed, total) = run_blocking(move || ballot::retract_ballot(&db, poll_id, &caller)).await?;

    info!("Ballot removed from poll {} by {}", poll_id, identity.key());
    Ok(Json(json!({ "removed": removed, "total_votes": total })))
}

pub async fn check_eligibility(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let identity = identify(&state, &headers);
    let db = state.db.clone();
    let answer =
        run_blocking(move || eligibility::check_eligibility(&db, poll_id, &identity)).await?;
    Ok(Json(answer))
}

pub async fn get_results(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let db = state.db.clone();
    let results = run_blocking(move || tally::get_results(&db, poll_id)).await?;
    Ok(Json(results))
}
