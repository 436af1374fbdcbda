//! Stream transport (§4.2, §6): a long-lived SSE response paired with a
//! POST sink. Grounded on the teacher's `handle_stream`/broadcast-to-SSE
//! pattern, reshaped around per-session `mpsc` queues instead of a shared
//! broadcast channel since delivery here is session-scoped, not fan-out.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::auth::verify_bearer;
use crate::audit::AuditEvent;
use crate::rate_limit::EndpointClass;
use crate::response::ApiError;
use crate::router::dispatch;
use crate::rpc::{JsonRpcRequest, JsonRpcResponse};
use crate::state::GuardrailServerState;
use guardrail_session::SessionManager;

/// Marks the session closed the moment the SSE stream is dropped, whether
/// that's the client disconnecting or the queue running dry. Holding this
/// inside the generator body is the only reliable disconnect signal axum
/// gives us: there's no separate "on disconnect" callback.
struct SessionGuard {
    sessions: Arc<SessionManager>,
    token_id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.revoke(self.token_id);
    }
}

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default = "default_project_slug")]
    pub project_slug: String,
    #[serde(default = "default_agent_kind")]
    pub agent_kind: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

fn default_project_slug() -> String {
    "default".to_string()
}

fn default_agent_kind() -> String {
    "unknown".to_string()
}

fn default_client_version() -> String {
    "unknown".to_string()
}

/// `GET <base>/stream` (§6: "a long-lived HTTP response that streams framed
/// text events"). Opens a session and immediately emits the one-shot
/// `endpoint` event identifying it and the URL to POST requests to.
pub async fn open_stream(
    State(state): State<GuardrailServerState>,
    Query(params): Query<StreamParams>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if let Err(err) = verify_bearer(&headers, &state.mcp_api_key) {
        state.audit.record(AuditEvent::AuthFailure {
            api_key_class: "mcp",
        });
        return Err(err.into());
    }

    let decision = state
        .rate_limiter
        .check(&state.mcp_api_key, EndpointClass::Stream, state.rate_limit_stream_per_min)
        .await;
    if !decision.allowed {
        return Err(
            guardrail_types::GuardrailError::rate_limited(decision.retry_after_secs).into(),
        );
    }

    let outcome = state
        .sessions
        .init(&params.project_slug, &params.agent_kind, &params.client_version)
        .await?;

    state.audit.record(AuditEvent::AuthSuccess {
        api_key_class: "mcp",
        api_key_hash: crate::config::Config::redacted_secret_hash(&state.mcp_api_key),
    });
    state.audit.record(AuditEvent::SessionCreated {
        project_slug: params.project_slug.clone(),
    });

    // The session id is the token itself; the token carries the claims the
    // server needs, so we don't maintain a separate lookup table for it.
    let session_id = outcome.token.clone();
    let post_url = format!("{}?session_id={}", state.message_base_url, session_id);

    let endpoint_event = Event::default().event("endpoint").data(
        json!({
            "session_id": session_id,
            "post_url": post_url,
            "expires_at": outcome.expires_at,
            "project_preamble": outcome.project_preamble,
            "active_rule_count": outcome.active_rule_count,
            "capabilities": outcome.capabilities,
        })
        .to_string(),
    );

    let token_for_lookup = state
        .sessions
        .verify(&outcome.token)
        .map_err(|_| guardrail_types::GuardrailError::internal())?
        .token_id;
    let entry = state
        .sessions
        .entry(token_for_lookup)
        .ok_or_else(guardrail_types::GuardrailError::internal)?;

    let guard = SessionGuard {
        sessions: state.sessions.clone(),
        token_id: token_for_lookup,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        yield Ok(endpoint_event);

        let Some(rx) = entry.queue_rx.lock().take() else { return; };
        let mut rx = ReceiverStream::new(rx);

        while let Some(payload) = rx.next().await {
            yield Ok(Event::default().event("message").data(payload.to_string()));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL).text("ping")))
}

#[derive(Debug, Deserialize)]
pub struct MessageParams {
    pub session_id: String,
}

/// `POST <base>/message?session_id=<id>` (§4.2, §6). Status codes:
/// `410` unknown/closed session, `202` accepted (request or notification),
/// `503` queue full.
pub async fn post_message(
    State(state): State<GuardrailServerState>,
    Query(params): Query<MessageParams>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let claims = match state.sessions.verify(&params.session_id) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::GONE.into_response(),
    };

    let Some(entry) = state.sessions.entry(claims.token_id) else {
        return StatusCode::GONE.into_response();
    };

    let is_notification = request.is_notification();
    let response = dispatch(&state, &claims, request).await;

    if is_notification {
        return StatusCode::ACCEPTED.into_response();
    }

    let payload: Value = serde_json::to_value(&response).unwrap_or_else(|_| {
        serde_json::to_value(JsonRpcResponse::success(Value::Null, Value::Null))
            .expect("fallback response always serializes")
    });

    match entry.queue_tx.try_send(payload) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(mpsc::error::TrySendError::Full(_)) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Err(mpsc::error::TrySendError::Closed(_)) => StatusCode::GONE.into_response(),
    }
}
