//! axum transport for the guardrail policy service (§4.2, §4.6, §6):
//! the SSE/JSON-RPC session stream, the IDE HTTP surface, and the
//! cross-cutting auth/rate-limit/audit/health machinery wired around them.

pub mod audit;
pub mod auth;
pub mod config;
pub mod health;
pub mod ide;
pub mod rate_limit;
pub mod response;
pub mod router;
pub mod rpc;
pub mod state;
pub mod stream;

pub use config::Config;
pub use router::build_router;
pub use state::GuardrailServerState;
