use std::sync::Arc;

use anyhow::anyhow;
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use opine_core::VoteError;
use opine_db::Database;
use opine_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{AppError, AppResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
}

const TOKEN_TTL_DAYS: i64 = 30;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();

    if username.len() < 3 || username.len() > 32 {
        return Err(VoteError::Validation("username must be 3-32 characters".into()).into());
    }
    if !email.contains('@') || email.len() < 5 || email.len() > 254 {
        return Err(VoteError::Validation("enter a valid email address".into()).into());
    }
    if req.password.len() < 8 || req.password.len() > 128 {
        return Err(VoteError::Validation("password must be 8-128 characters".into()).into());
    }

    if state.db.get_user_by_username(&username)?.is_some() {
        return Err(VoteError::Conflict("username is taken".into()).into());
    }
    if state.db.get_user_by_email(&email)?.is_some() {
        return Err(VoteError::Conflict("email is already registered".into()).into());
    }

    let user_id = Uuid::new_v4();
    let password_hash = hash_password(&req.password)?;
    state
        .db
        .create_user(&user_id.to_string(), &username, &email, &password_hash)?;

    let token = create_token(user_id, &username, &state.jwt_secret)?;
    info!("User {} registered", username);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let Some(user) = state.db.get_user_by_username(req.username.trim())? else {
        return Err(AppError::Unauthorized);
    };
    if !verify_password(&req.password, &user.password) {
        return Err(AppError::Unauthorized);
    }

    let user_id = Uuid::parse_str(&user.id)
        .map_err(|e| AppError::Internal(anyhow!("corrupt user id {:?}: {}", user.id, e)))?;
    let token = create_token(user_id, &user.username, &state.jwt_secret)?;
    info!("User {} logged in", user.username);

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(user_id: Uuid, username: &str, jwt_secret: &str) -> Result<String, AppError> {
    let exp = (Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::Error::new(e)))
}
