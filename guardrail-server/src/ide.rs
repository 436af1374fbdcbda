//! IDE HTTP surface (§6): bearer-auth routes a plain IDE integration can
//! call directly, without standing up the MCP stream transport.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use guardrail_types::{FileEditInput, GuardrailError, SelectionInput};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::verify_bearer;
use crate::audit::AuditEvent;
use crate::rate_limit::EndpointClass;
use crate::response::ApiError;
use crate::state::GuardrailServerState;

fn default_project_slug() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ValidateFileRequest {
    pub file_path: String,
    pub content: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_project_slug")]
    pub project_slug: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateSelectionRequest {
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_project_slug")]
    pub project_slug: String,
}

async fn authenticate(
    state: &GuardrailServerState,
    headers: &HeaderMap,
) -> Result<(), ApiError> {
    if let Err(err) = verify_bearer(headers, &state.ide_api_key) {
        state.audit.record(AuditEvent::AuthFailure { api_key_class: "ide" });
        return Err(err.into());
    }

    let decision = state
        .rate_limiter
        .check(&state.ide_api_key, EndpointClass::Validation, state.rate_limit_validate_per_min)
        .await;
    if !decision.allowed {
        return Err(GuardrailError::rate_limited(decision.retry_after_secs).into());
    }

    Ok(())
}

pub async fn validate_file(
    State(state): State<GuardrailServerState>,
    headers: HeaderMap,
    Json(body): Json<ValidateFileRequest>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;

    let input = FileEditInput {
        project_slug: body.project_slug,
        path: body.file_path,
        old_string: String::new(),
        new_string: body.content,
    };
    let result = state.engine.validate_file_edit(&input).await?;
    if !result.valid {
        state.audit.record(AuditEvent::ValidationDenied {
            category: "file_edit",
            rule_ids: result.violations.iter().map(|v| v.rule_id.clone()).collect(),
        });
    }
    Ok(Json(serde_json::to_value(result).expect("ValidationResult always serializes")))
}

pub async fn validate_selection(
    State(state): State<GuardrailServerState>,
    headers: HeaderMap,
    Json(body): Json<ValidateSelectionRequest>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;

    let input = SelectionInput {
        project_slug: body.project_slug,
        code: body.code,
        language: body.language,
    };
    let result = state.engine.validate_selection(&input).await?;
    Ok(Json(serde_json::to_value(result).expect("ValidationResult always serializes")))
}

#[derive(Debug, Deserialize)]
pub struct ProjectQuery {
    #[serde(default = "default_project_slug", rename = "project")]
    pub project_slug: String,
}

pub async fn list_rules(
    State(state): State<GuardrailServerState>,
    headers: HeaderMap,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;

    let store = state.backends.rule_store.clone();
    let slug = query.project_slug.clone();
    let rules = state
        .backends
        .breakers
        .store
        .call(|| async move { store.load_active_rules(&slug).await })
        .await
        .map_err(|_| GuardrailError::backend_unavailable())?;

    Ok(Json(serde_json::to_value(rules).expect("Rule always serializes")))
}

pub async fn quick_reference(
    State(state): State<GuardrailServerState>,
    headers: HeaderMap,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;

    let entries = state.engine.quick_reference(&query.project_slug).await?;
    Ok(Json(serde_json::to_value(entries).expect("QuickReferenceEntry always serializes")))
}

pub async fn ide_health(
    State(state): State<GuardrailServerState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(json!({ "status": "ok" })))
}
