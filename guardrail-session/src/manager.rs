//! Session manager (§4.1): issues, verifies, and revokes tokens, and owns
//! the per-session outbound queue and connection state the stream transport
//! reads from.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use guardrail_store::Backends;
use guardrail_types::{GuardrailError, Project, SessionClaims, SessionVerifyError};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::token::TokenCodec;

/// Default token lifetime (§4.1: "default 15 min").
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(15 * 60);

/// Default bound on a session's outbound event queue (§4.2: "fixed (e.g.,
/// 64)").
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Project preamble used when no project is found for a session's slug
/// (§4.1: "stored context string or a constant default").
pub const DEFAULT_PREAMBLE: &str =
    "No project-specific context is configured. Follow the enabled rules for this session.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Server-side state bound to a live token (§3).
pub struct SessionEntry {
    pub claims: SessionClaims,
    pub connection: parking_lot::Mutex<ConnectionState>,
    pub queue_tx: mpsc::Sender<serde_json::Value>,
    pub queue_rx: parking_lot::Mutex<Option<mpsc::Receiver<serde_json::Value>>>,
    pub last_activity: parking_lot::Mutex<chrono::DateTime<Utc>>,
}

/// Outcome of a successful `init` call (§4.1).
pub struct InitOutcome {
    pub token: String,
    pub expires_at: chrono::DateTime<Utc>,
    pub project_preamble: String,
    pub active_rule_count: usize,
    pub capabilities: Vec<&'static str>,
}

/// The set of JSON-RPC methods this server understands, returned on init so
/// older clients can detect missing methods (§10.5 capabilities
/// negotiation).
pub const CAPABILITIES: &[&str] = &[
    "guardrail_init_session",
    "guardrail_validate_bash",
    "guardrail_validate_file_edit",
    "guardrail_validate_git_operation",
    "guardrail_validate_scope",
    "guardrail_validate_commit",
    "guardrail_validate_push",
    "guardrail_pre_work_check",
    "guardrail_batch_validate",
];

pub struct SessionManager {
    codec: TokenCodec,
    ttl: Duration,
    queue_capacity: usize,
    sessions: DashMap<Uuid, Arc<SessionEntry>>,
    revoked: DashMap<Uuid, ()>,
    backends: Backends,
}

impl SessionManager {
    pub fn new(secret: &str, backends: Backends) -> Self {
        Self {
            codec: TokenCodec::new(secret),
            ttl: DEFAULT_SESSION_TTL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sessions: DashMap::new(),
            revoked: DashMap::new(),
            backends,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// `init` (§4.1): issues a token, creates server-side session state, and
    /// returns the project preamble/capabilities bundle.
    pub async fn init(
        &self,
        project_slug: &str,
        agent_kind: &str,
        client_version: &str,
    ) -> Result<InitOutcome, GuardrailError> {
        let project = self.backends.rule_store.load_project(project_slug).await.ok();
        let (preamble, active_rule_count) = match &project {
            Some(project) => (
                project.preamble.clone().unwrap_or_else(|| DEFAULT_PREAMBLE.to_string()),
                project.active_rules.len(),
            ),
            None => (DEFAULT_PREAMBLE.to_string(), 0),
        };

        let now = Utc::now();
        let token_id = Uuid::new_v4();
        let claims = SessionClaims {
            token_id,
            project_slug: Some(project_slug.to_string()),
            agent_kind: agent_kind.to_string(),
            client_version: client_version.to_string(),
            issued_at: now,
            expires_at: now
                + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::minutes(15)),
        };

        let token = self.codec.sign(&claims);
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        self.sessions.insert(
            token_id,
            Arc::new(SessionEntry {
                claims: claims.clone(),
                connection: parking_lot::Mutex::new(ConnectionState::Open),
                queue_tx: tx,
                queue_rx: parking_lot::Mutex::new(Some(rx)),
                last_activity: parking_lot::Mutex::new(now),
            }),
        );

        tracing::info!(token_id = %token_id, project_slug, "session initialised");

        Ok(InitOutcome {
            token,
            expires_at: claims.expires_at,
            project_preamble: preamble,
            active_rule_count,
            capabilities: CAPABILITIES.to_vec(),
        })
    }

    /// `verify` (§4.1): total function over every string — returns claims or
    /// exactly one `SessionVerifyError` variant (§8).
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionVerifyError> {
        let claims = self.codec.verify(token)?;

        if self.revoked.contains_key(&claims.token_id) {
            return Err(SessionVerifyError::Revoked);
        }
        if claims.is_expired_at(Utc::now()) {
            return Err(SessionVerifyError::Expired);
        }

        if let Some(entry) = self.sessions.get(&claims.token_id) {
            *entry.last_activity.lock() = Utc::now();
        }

        Ok(claims)
    }

    pub fn revoke(&self, token_id: Uuid) {
        self.revoked.insert(token_id, ());
        if let Some(entry) = self.sessions.get(&token_id) {
            *entry.connection.lock() = ConnectionState::Closed;
        }
        self.sessions.remove(&token_id);
        tracing::info!(token_id = %token_id, "session revoked");
    }

    /// Periodic sweep dropping expired, still-tracked sessions (§4.1:
    /// `on_expire` as an internal periodic sweep). Does not touch the
    /// revocation set: an expired token is already rejected by `verify`
    /// without needing to be revoked.
    pub fn sweep_expired(&self) {
        let now = Utc::now();
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.claims.is_expired_at(now))
            .map(|entry| entry.claims.token_id)
            .collect();

        for token_id in expired {
            self.sessions.remove(&token_id);
        }
    }

    pub fn entry(&self, token_id: Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.get(&token_id).map(|e| e.clone())
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_store::{InMemoryCache, InMemoryRuleStore};

    fn manager() -> SessionManager {
        let backends = Backends::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryCache::new()),
        );
        SessionManager::new("0123456789abcdef0123456789abcdef", backends)
    }

    #[tokio::test]
    async fn init_then_verify_succeeds() {
        let manager = manager();
        let outcome = manager.init("demo", "cli", "1.0.0").await.unwrap();
        let claims = manager.verify(&outcome.token).unwrap();
        assert_eq!(claims.project_slug.as_deref(), Some("demo"));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() {
        let manager = manager();
        let outcome = manager.init("demo", "cli", "1.0.0").await.unwrap();
        let claims = manager.verify(&outcome.token).unwrap();

        manager.revoke(claims.token_id);
        assert_eq!(manager.verify(&outcome.token), Err(SessionVerifyError::Revoked));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let manager = manager().with_ttl(Duration::from_millis(1));
        let outcome = manager.init("demo", "cli", "1.0.0").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.verify(&outcome.token), Err(SessionVerifyError::Expired));
    }

    #[tokio::test]
    async fn missing_project_uses_default_preamble() {
        let manager = manager();
        let outcome = manager.init("unknown-project", "cli", "1.0.0").await.unwrap();
        assert_eq!(outcome.project_preamble, DEFAULT_PREAMBLE);
        assert_eq!(outcome.active_rule_count, 0);
    }

    #[tokio::test]
    async fn sweep_removes_expired_session_entries() {
        let manager = manager().with_ttl(Duration::from_millis(1));
        manager.init("demo", "cli", "1.0.0").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        manager.sweep_expired();
        assert_eq!(manager.active_session_count(), 0);
    }
}
