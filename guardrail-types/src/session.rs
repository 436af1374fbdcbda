use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims carried by a verified session token (§3). `token_id` is the
/// revocation-set key; the rest is opaque context the caller may use to filter
/// rules or seed audit events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub token_id: uuid::Uuid,
    pub project_slug: Option<String>,
    pub agent_kind: String,
    pub client_version: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Distinct reasons token verification can fail (§3, §8). All of these map to
/// the single public `INVALID_SESSION` error to avoid telling a caller which
/// predicate failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVerifyError {
    InvalidSignature,
    Expired,
    Revoked,
    Malformed,
}

impl SessionVerifyError {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::Malformed => "MALFORMED",
        }
    }
}
