use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Poll, PollOption};

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// ── Auth ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// ── Polls ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple_choices: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    #[serde(flatten)]
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

// ── Voting ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub option_ids: Vec<String>,
}

/// What the ballot writer hands back after a committed write.
#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub poll_id: Uuid,
    pub voted_options: Vec<Uuid>,
    pub total_votes: i64,
}

/// Advisory answer from the eligibility checker. The ballot writer
/// re-validates everything inside its own transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Eligibility {
    pub can_vote: bool,
    pub has_voted: bool,
    pub status: EligibilityStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityStatus {
    Eligible,
    CanChange,
    NotFound,
    Inactive,
    Expired,
}

// ── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct OptionTally {
    pub option_id: Uuid,
    pub text: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll_id: Uuid,
    pub options: Vec<OptionTally>,
    pub total_votes: i64,
}
