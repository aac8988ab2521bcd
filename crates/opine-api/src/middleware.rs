use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{DecodingKey, Validation, decode};

use opine_types::api::Claims;

use crate::auth::AppState;

/// Gate for routes that only make sense signed-in. Validated claims are
/// stashed as a request extension for the handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims =
        claims_from_headers(req.headers(), &state.jwt_secret).ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Tolerant extraction for routes serving both signed-in and anonymous
/// callers. A missing or invalid token just means "anonymous".
pub fn claims_from_headers(headers: &HeaderMap, jwt_secret: &str) -> Option<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
