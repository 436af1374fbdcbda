//! JSON-RPC method dispatch (§4.3, §6) and the axum [`Router`] that wires
//! the stream transport, IDE HTTP surface, and health endpoints together.
//! Grounded on the teacher's `create_router`/`handle_rpc` shape in
//! `vtcode-core/src/a2a/server.rs`.

use axum::routing::{get, post};
use axum::Router;
use guardrail_types::{
    BashInput, BatchItem, BatchValidateInput, CommitInput, FileEditInput, GitOperationInput,
    GuardrailErrorCode, PreWorkCheckInput, PushInput, ScopeInput, SessionClaims,
};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use crate::audit::AuditEvent;
use crate::health;
use crate::ide;
use crate::rpc::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, METHOD_BATCH_VALIDATE, METHOD_INIT_SESSION,
    METHOD_PRE_WORK_CHECK, METHOD_VALIDATE_BASH, METHOD_VALIDATE_COMMIT,
    METHOD_VALIDATE_FILE_EDIT, METHOD_VALIDATE_GIT_OPERATION, METHOD_VALIDATE_PUSH,
    METHOD_VALIDATE_SCOPE,
};
use crate::state::GuardrailServerState;
use crate::stream;

pub fn build_router(state: GuardrailServerState) -> Router {
    Router::new()
        .route("/mcp/stream", get(stream::open_stream))
        .route("/mcp/message", post(stream::post_message))
        .route("/ide/validate/file", post(ide::validate_file))
        .route("/ide/validate/selection", post(ide::validate_selection))
        .route("/ide/rules", get(ide::list_rules))
        .route("/ide/quick-reference", get(ide::quick_reference))
        .route("/ide/health", get(ide::ide_health))
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Dispatch a single JSON-RPC request against the session's claims,
/// producing a full response. Parse/shape errors become JSON-RPC protocol
/// errors (`-326xx`); domain failures become `guardrail_error` payloads
/// (§6).
pub async fn dispatch(
    state: &GuardrailServerState,
    claims: &SessionClaims,
    request: JsonRpcRequest,
) -> JsonRpcResponse {
    let id = request.id.clone().unwrap_or(Value::Null);

    let result = dispatch_method(state, claims, &request.method, request.params).await;

    match result {
        Ok(value) => JsonRpcResponse::success(value, id),
        Err(DispatchError::Protocol(err)) => JsonRpcResponse::error(err, id),
        Err(DispatchError::Domain(err)) => {
            if err.code == GuardrailErrorCode::InternalError {
                tracing::error!(method = %request.method, message = %err.message, "rpc handler failed");
            }
            if matches!(err.code, GuardrailErrorCode::BackendUnavailable) {
                state.audit.record(AuditEvent::ValidationDenied {
                    category: "backend_unavailable",
                    rule_ids: Vec::new(),
                });
            }
            JsonRpcResponse::error(JsonRpcError::from_guardrail_error(&err), id)
        }
    }
}

enum DispatchError {
    Protocol(JsonRpcError),
    Domain(guardrail_types::GuardrailError),
}

impl From<guardrail_types::GuardrailError> for DispatchError {
    fn from(err: guardrail_types::GuardrailError) -> Self {
        Self::Domain(err)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, DispatchError> {
    serde_json::from_value(params.unwrap_or(Value::Null)).map_err(|err| {
        DispatchError::Protocol(JsonRpcError::invalid_params(format!(
            "invalid params: {err}"
        )))
    })
}

async fn dispatch_method(
    state: &GuardrailServerState,
    claims: &SessionClaims,
    method: &str,
    params: Option<Value>,
) -> Result<Value, DispatchError> {
    match method {
        METHOD_INIT_SESSION => {
            // The stream transport already called `SessionManager::init`
            // when this connection opened (§4.2); this method re-surfaces
            // that bundle for a client that wants to (re)read it over the
            // channel rather than out of the `endpoint` event.
            Ok(serde_json::json!({
                "project_slug": claims.project_slug,
                "agent_kind": claims.agent_kind,
                "expires_at": claims.expires_at,
                "capabilities": guardrail_session::CAPABILITIES,
            }))
        }
        METHOD_VALIDATE_BASH => {
            let mut input: BashInput = parse_params(params)?;
            input.project_slug = session_project_slug(claims);
            let result = state.engine.validate_bash(&input).await?;
            audit_if_denied(state, "bash", result.valid, &result.violations);
            Ok(serde_json::to_value(result).expect("ValidationResult always serializes"))
        }
        METHOD_VALIDATE_FILE_EDIT => {
            let mut input: FileEditInput = parse_params(params)?;
            input.project_slug = session_project_slug(claims);
            let result = state.engine.validate_file_edit(&input).await?;
            audit_if_denied(state, "file_edit", result.valid, &result.violations);
            Ok(serde_json::to_value(result).expect("ValidationResult always serializes"))
        }
        METHOD_VALIDATE_GIT_OPERATION => {
            let mut input: GitOperationInput = parse_params(params)?;
            input.project_slug = session_project_slug(claims);
            let result = state.engine.validate_git_operation(&input).await?;
            audit_if_denied(state, "git", result.valid, &result.violations);
            Ok(serde_json::to_value(result).expect("ValidationResult always serializes"))
        }
        METHOD_VALIDATE_SCOPE => {
            let input: ScopeInput = parse_params(params)?;
            let result = state.engine.validate_scope(&input);
            audit_if_denied(state, "scope", result.valid, &[]);
            Ok(serde_json::to_value(result).expect("ScopeResult always serializes"))
        }
        METHOD_VALIDATE_COMMIT => {
            let input: CommitInput = parse_params(params)?;
            let result = state.engine.validate_commit(&input.message);
            audit_if_denied(state, "commit", result.valid, &[]);
            Ok(serde_json::to_value(result).expect("CommitResult always serializes"))
        }
        METHOD_VALIDATE_PUSH => {
            let input: PushInput = parse_params(params)?;
            let result = state.engine.validate_push(&input);
            audit_if_denied(state, "push", result.valid, &[]);
            Ok(serde_json::to_value(result).expect("PushValidation always serializes"))
        }
        METHOD_PRE_WORK_CHECK => {
            let input: PreWorkCheckInput = parse_params(params)?;
            let failures = state
                .engine
                .pre_work_check(&session_project_slug(claims), &input.file_paths)
                .await?;
            Ok(serde_json::to_value(failures).expect("FailureRecord always serializes"))
        }
        METHOD_BATCH_VALIDATE => {
            let mut input: BatchValidateInput = parse_params(params)?;
            for item in &mut input.items {
                match item {
                    BatchItem::ValidateBash(bash) => bash.project_slug = session_project_slug(claims),
                    BatchItem::ValidateFileEdit(edit) => edit.project_slug = session_project_slug(claims),
                    BatchItem::ValidateGitOperation(git) => git.project_slug = session_project_slug(claims),
                    BatchItem::ValidateScope(_)
                    | BatchItem::ValidateCommit(_)
                    | BatchItem::ValidatePush(_) => {}
                }
            }
            let outcomes = state.engine.batch_validate(&input).await?;
            Ok(serde_json::to_value(outcomes).expect("BatchOutcome always serializes"))
        }
        other => Err(DispatchError::Protocol(JsonRpcError::method_not_found(
            other,
        ))),
    }
}

/// The session's bound project, falling through to `"default"` for the
/// rare claims bundle with no project attached (`SessionManager::init`
/// always sets one in practice, but `SessionClaims.project_slug` stays
/// `Option` at the type level).
fn session_project_slug(claims: &SessionClaims) -> String {
    claims
        .project_slug
        .clone()
        .unwrap_or_else(|| "default".to_string())
}

fn audit_if_denied(
    state: &GuardrailServerState,
    category: &'static str,
    valid: bool,
    violations: &[guardrail_types::Violation],
) {
    if !valid {
        state.audit.record(AuditEvent::ValidationDenied {
            category,
            rule_ids: violations.iter().map(|v| v.rule_id.clone()).collect(),
        });
    }
}
