//! Shared axum router state (grounded on the teacher's `A2aServerState`):
//! everything a handler needs, Arc-wrapped so cloning the state per request
//! is cheap.

use std::sync::Arc;

use guardrail_engine::ValidationEngine;
use guardrail_session::SessionManager;
use guardrail_store::Backends;

use crate::audit::AuditSink;
use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct GuardrailServerState {
    pub engine: Arc<ValidationEngine>,
    pub sessions: Arc<SessionManager>,
    pub backends: Backends,
    pub audit: AuditSink,
    pub rate_limiter: Arc<RateLimiter>,
    pub mcp_api_key: Arc<str>,
    pub ide_api_key: Arc<str>,
    pub rate_limit_init_per_min: u32,
    pub rate_limit_validate_per_min: u32,
    pub rate_limit_stream_per_min: u32,
    /// Base URL handed back in the stream's `endpoint` event so clients know
    /// where to POST inbound requests (§4.2).
    pub message_base_url: Arc<str>,
}
