//! API key authentication (§4.6): two independent bearer keys, one for MCP
//! (stream + session) clients and one for IDE clients. Neither key is ever
//! logged in full.

use axum::http::HeaderMap;
use guardrail_types::GuardrailError;
use subtle::ConstantTimeEq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyClass {
    Mcp,
    Ide,
}

/// Extract and constant-time compare the bearer token in `Authorization`
/// against `expected`. A missing or malformed header is indistinguishable
/// from a wrong key to the caller (both surface as `INVALID_API_KEY`).
pub fn verify_bearer(headers: &HeaderMap, expected: &str) -> Result<(), GuardrailError> {
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(GuardrailError::invalid_api_key)?;

    if presented.as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(GuardrailError::invalid_api_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn matching_key_is_accepted() {
        assert!(verify_bearer(&headers_with_bearer("secret-key"), "secret-key").is_ok());
    }

    #[test]
    fn mismatched_key_is_rejected() {
        assert!(verify_bearer(&headers_with_bearer("wrong-key"), "secret-key").is_err());
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(verify_bearer(&HeaderMap::new(), "secret-key").is_err());
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert!(verify_bearer(&headers, "secret-key").is_err());
    }
}
