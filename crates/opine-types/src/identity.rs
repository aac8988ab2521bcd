use std::net::IpAddr;

use uuid::Uuid;

/// Who is casting a ballot. Exactly one of the two shapes exists for any
/// request; there is no half-resolved state.
///
/// Anonymous voters are keyed on their client IP for duplicate detection.
/// The fingerprint travels alongside for audit purposes only and never
/// participates in uniqueness checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoterIdentity {
    Authenticated(Uuid),
    Anonymous { ip: IpAddr, fingerprint: String },
}

impl VoterIdentity {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            VoterIdentity::Authenticated(id) => Some(*id),
            VoterIdentity::Anonymous { .. } => None,
        }
    }

    /// Stable key for rate-limit buckets and log lines.
    pub fn key(&self) -> String {
        match self {
            VoterIdentity::Authenticated(id) => format!("user:{}", id),
            VoterIdentity::Anonymous { ip, .. } => format!("ip:{}", ip),
        }
    }
}
