use std::net::{IpAddr, Ipv4Addr};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use opine_types::identity::VoterIdentity;

/// Request metadata the resolver inspects. Plain strings so the engine
/// never sees an HTTP type; the API layer fills this in from headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestMeta<'a> {
    pub forwarded_for: Option<&'a str>,
    pub real_ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub accept_language: Option<&'a str>,
}

/// Recorded when no forwarding header yields a parseable address.
pub const FALLBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const FINGERPRINT_WIDTH: usize = 32;

/// Resolve who is acting. A verified session wins outright and carries no
/// request-derived data; everything else becomes an anonymous identity
/// keyed on the client IP.
pub fn resolve_identity(user_id: Option<Uuid>, meta: &RequestMeta) -> VoterIdentity {
    if let Some(id) = user_id {
        return VoterIdentity::Authenticated(id);
    }
    let ip = client_ip(meta);
    VoterIdentity::Anonymous {
        fingerprint: fingerprint(ip, meta),
        ip,
    }
}

/// First hop of x-forwarded-for, then x-real-ip, strictly parsed. Header
/// garbage never reaches storage or a duplicate comparison.
pub fn client_ip(meta: &RequestMeta) -> IpAddr {
    let candidate = meta
        .forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| meta.real_ip.map(str::trim).filter(|s| !s.is_empty()));

    candidate
        .and_then(|s| s.parse::<IpAddr>().ok())
        .unwrap_or(FALLBACK_IP)
}

/// Constant-width digest of (ip, user-agent, accept-language). Audit data
/// only; duplicate detection keys on the IP alone.
fn fingerprint(ip: IpAddr, meta: &RequestMeta) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(meta.user_agent.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(meta.accept_language.unwrap_or("").as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_WIDTH].to_string()
}
