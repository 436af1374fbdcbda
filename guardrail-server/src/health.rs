//! Health endpoints (§6): `/health/live` always 200; `/health/ready` probes
//! both breakers and reports `degraded: true` rather than failing outright
//! when exactly one backend is unavailable.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use guardrail_store::BreakerState;
use serde_json::json;

use crate::state::GuardrailServerState;

pub async fn live() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<GuardrailServerState>) -> (StatusCode, Json<serde_json::Value>) {
    let store_state = state.backends.breakers.store.state();
    let cache_state = state.backends.breakers.cache.state();

    let store_down = store_state == BreakerState::Open;
    let cache_down = cache_state == BreakerState::Open;
    let degraded = store_down || cache_down;

    let body = json!({
        "status": if degraded { "degraded" } else { "ok" },
        "degraded": degraded,
        "rule_store": breaker_state_label(store_state),
        "cache": breaker_state_label(cache_state),
    });

    (StatusCode::OK, Json(body))
}

fn breaker_state_label(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    }
}
