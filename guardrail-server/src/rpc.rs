//! JSON-RPC 2.0 envelope (§6) shared by the request/response RPC surface and
//! the stream transport's `message` events.

use guardrail_types::{GuardrailError, GuardrailErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC protocol error codes (§6: "`-32600..-32699` for protocol errors").
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Absent on notifications (§4.2: "notification (no id)").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(error: JsonRpcError, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, message)
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// A domain error (§6: carries `data.guardrail_error`). The protocol code
    /// is always `INTERNAL_ERROR`-range since the taxonomy lives in `data`,
    /// not in the JSON-RPC code space.
    pub fn from_guardrail_error(err: &GuardrailError) -> Self {
        Self {
            code: INTERNAL_ERROR,
            message: err.message.clone(),
            data: Some(serde_json::json!({
                "guardrail_error": {
                    "type": guardrail_error_type(err.code),
                    "code": err.code.as_str(),
                    "message": err.message,
                    "suggestion": err.suggestion,
                }
            })),
        }
    }
}

fn guardrail_error_type(code: GuardrailErrorCode) -> &'static str {
    match code {
        GuardrailErrorCode::InvalidSession => "INVALID_SESSION",
        GuardrailErrorCode::InvalidApiKey => "INVALID_API_KEY",
        GuardrailErrorCode::RateLimited => "RATE_LIMITED",
        GuardrailErrorCode::InvalidArgument => "INVALID_ARGUMENT",
        GuardrailErrorCode::BackendUnavailable => "BACKEND_UNAVAILABLE",
        GuardrailErrorCode::InternalError => "INTERNAL_ERROR",
    }
}

/// The 9 methods this server understands (§6).
pub const METHOD_INIT_SESSION: &str = "guardrail_init_session";
pub const METHOD_VALIDATE_BASH: &str = "guardrail_validate_bash";
pub const METHOD_VALIDATE_FILE_EDIT: &str = "guardrail_validate_file_edit";
pub const METHOD_VALIDATE_GIT_OPERATION: &str = "guardrail_validate_git_operation";
pub const METHOD_VALIDATE_SCOPE: &str = "guardrail_validate_scope";
pub const METHOD_VALIDATE_COMMIT: &str = "guardrail_validate_commit";
pub const METHOD_VALIDATE_PUSH: &str = "guardrail_validate_push";
pub const METHOD_PRE_WORK_CHECK: &str = "guardrail_pre_work_check";
pub const METHOD_BATCH_VALIDATE: &str = "guardrail_batch_validate";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_has_no_id() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"x"}"#).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn request_with_id_is_not_a_notification() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"x","id":1}"#).unwrap();
        assert!(!req.is_notification());
    }

    #[test]
    fn guardrail_error_conversion_carries_code_in_data() {
        let err = GuardrailError::invalid_session();
        let rpc_err = JsonRpcError::from_guardrail_error(&err);
        assert_eq!(
            rpc_err.data.unwrap()["guardrail_error"]["code"],
            "INVALID_SESSION"
        );
    }
}
