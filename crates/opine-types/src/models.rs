use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub creator_id: Uuid,
    pub is_active: bool,
    pub allow_multiple_choices: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub text: String,
    pub order_index: i64,
}

/// Why a user has a stake in a poll. A user can hold several of these for
/// the same poll at once; they are distinct rows, not a single mutable
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestType {
    Creator,
    Voter,
    Follower,
}

impl InterestType {
    pub fn as_str(self) -> &'static str {
        match self {
            InterestType::Creator => "creator",
            InterestType::Voter => "voter",
            InterestType::Follower => "follower",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "creator" => Some(InterestType::Creator),
            "voter" => Some(InterestType::Voter),
            "follower" => Some(InterestType::Follower),
            _ => None,
        }
    }
}

/// Notification categories recorded in the dedup ledger. One email per
/// (user, poll, kind), ever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ExpiringSoon,
    Expired,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::ExpiringSoon => "expiring_soon",
            NotificationKind::Expired => "expired",
        }
    }
}
