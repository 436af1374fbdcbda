//! Maps [`GuardrailError`] onto both wire formats: an axum `IntoResponse`
//! for the IDE HTTP surface, and a [`crate::rpc::JsonRpcError`] for the
//! JSON-RPC surface (§10.2: "one taxonomy, two transports").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardrail_types::{GuardrailError, GuardrailErrorCode};

/// Newtype so this crate can impl a foreign trait on a foreign type.
pub struct ApiError(pub GuardrailError);

impl From<GuardrailError> for ApiError {
    fn from(err: GuardrailError) -> Self {
        Self(err)
    }
}

fn status_for(code: GuardrailErrorCode) -> StatusCode {
    match code {
        GuardrailErrorCode::InvalidSession | GuardrailErrorCode::InvalidApiKey => {
            StatusCode::UNAUTHORIZED
        }
        GuardrailErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        GuardrailErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        GuardrailErrorCode::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        GuardrailErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code);
        let body = serde_json::json!({
            "code": self.0.code.as_str(),
            "message": self.0.message,
            "suggestion": self.0.suggestion,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_session_maps_to_401() {
        let err = ApiError::from(GuardrailError::invalid_session());
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let err = ApiError::from(GuardrailError::rate_limited(5));
        assert_eq!(err.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn backend_unavailable_maps_to_503() {
        let err = ApiError::from(GuardrailError::backend_unavailable());
        assert_eq!(
            err.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
