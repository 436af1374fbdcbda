use serde::{Deserialize, Serialize};

/// The surface-facing error taxonomy (§7). Every error that crosses a
/// transport boundary carries one of these codes, a human message, and a
/// suggestion — never a stack trace or internal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailErrorCode {
    InvalidSession,
    InvalidApiKey,
    RateLimited,
    InvalidArgument,
    BackendUnavailable,
    InternalError,
}

impl GuardrailErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSession => "INVALID_SESSION",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::RateLimited => "RATE_LIMITED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::BackendUnavailable => "BACKEND_UNAVAILABLE",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// A data-plane error: something that failed to evaluate, as distinct from a
/// policy outcome (`RULE_VIOLATION`, which rides inside a `200 OK`, see §7).
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{code_str}: {message}")]
pub struct GuardrailError {
    #[serde(skip)]
    pub code: GuardrailErrorCode,
    // Kept alongside `code` so `Serialize` round-trips through JSON without a
    // custom impl; `code` itself is skipped and reconstructed from this string
    // by `Deserialize` callers that need it (the wire format only needs the
    // string).
    code_str: &'static str,
    pub message: String,
    pub suggestion: String,
}

impl GuardrailError {
    pub fn new(
        code: GuardrailErrorCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            code,
            code_str: code.as_str(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn invalid_session() -> Self {
        Self::new(
            GuardrailErrorCode::InvalidSession,
            "session token is invalid or expired",
            "call guardrail_init_session to create a new token",
        )
    }

    pub fn invalid_api_key() -> Self {
        Self::new(
            GuardrailErrorCode::InvalidApiKey,
            "the provided API key is not recognised",
            "check the configured MCP or IDE key",
        )
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            GuardrailErrorCode::RateLimited,
            format!("rate limit exceeded, retry after {retry_after_secs}s"),
            "back off and retry after the indicated delay",
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(
            GuardrailErrorCode::InvalidArgument,
            message,
            "check the request payload against the method's schema",
        )
    }

    pub fn backend_unavailable() -> Self {
        Self::new(
            GuardrailErrorCode::BackendUnavailable,
            "a backend dependency is temporarily unavailable",
            "retry shortly; validation is serving degraded results in the meantime",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            GuardrailErrorCode::InternalError,
            "an internal error occurred",
            "retry; contact an administrator if this persists",
        )
    }
}
