//! Symmetric-MAC session tokens (§3, §4.1). A token is a base64url-encoded
//! `claims_json.signature` pair; the signature is HMAC-SHA256 over the exact
//! claims bytes so any mutation is detected.

use base64::Engine;
use guardrail_types::{SessionClaims, SessionVerifyError};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing-secret length (§4.1 invariant: "validated at startup for
/// length (≥32 bytes)").
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SigningSecretError {
    #[error("session signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    TooShort(usize),
    #[error("session signing secret must contain a mix of character classes")]
    LowEntropy,
}

/// Validate a configured signing secret at startup (§4.1, §7: "weak signing
/// secret" is a fatal startup condition).
pub fn validate_signing_secret(secret: &str) -> Result<(), SigningSecretError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(SigningSecretError::TooShort(secret.len()));
    }

    let has_lower = secret.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = secret.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = secret.chars().any(|c| c.is_ascii_digit());
    let has_symbol = secret.chars().any(|c| !c.is_ascii_alphanumeric());

    let class_count = [has_lower, has_upper, has_digit, has_symbol]
        .into_iter()
        .filter(|present| *present)
        .count();

    if class_count < 2 {
        return Err(SigningSecretError::LowEntropy);
    }

    Ok(())
}

/// Signs and verifies [`SessionClaims`] tokens with a single secret.
pub struct TokenCodec {
    secret: Vec<u8>,
}

impl TokenCodec {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn sign(&self, claims: &SessionClaims) -> String {
        let payload = serde_json::to_vec(claims).expect("SessionClaims always serializes");
        let payload_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&payload);

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{payload_b64}.{signature_b64}")
    }

    /// Verify a token's signature and structure only; expiry and revocation
    /// are checked by the caller (§4.1: distinct error kinds collapse to
    /// `INVALID_SESSION` publicly, but are distinguished internally for
    /// testability, §8).
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionVerifyError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(SessionVerifyError::Malformed)?;

        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| SessionVerifyError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        let expected = mac.finalize().into_bytes();

        if expected.as_slice().ct_eq(&signature).unwrap_u8() != 1 {
            return Err(SessionVerifyError::InvalidSignature);
        }

        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionVerifyError::Malformed)?;

        serde_json::from_slice(&payload).map_err(|_| SessionVerifyError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn claims() -> SessionClaims {
        SessionClaims {
            token_id: uuid::Uuid::new_v4(),
            project_slug: Some("demo".to_string()),
            agent_kind: "cli".to_string(),
            client_version: "1.0.0".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let codec = TokenCodec::new("0123456789abcdef0123456789abcdef");
        let original = claims();
        let token = codec.sign(&original);
        let verified = codec.verify(&token).unwrap();
        assert_eq!(verified.token_id, original.token_id);
    }

    #[test]
    fn tampered_payload_fails_signature_check() {
        let codec = TokenCodec::new("0123456789abcdef0123456789abcdef");
        let token = codec.sign(&claims());
        let (payload, signature) = token.split_once('.').unwrap();
        let tampered = format!("{payload}x.{signature}");
        assert_eq!(codec.verify(&tampered), Err(SessionVerifyError::InvalidSignature));
    }

    #[test]
    fn malformed_token_without_separator_is_rejected() {
        let codec = TokenCodec::new("0123456789abcdef0123456789abcdef");
        assert_eq!(codec.verify("not-a-token"), Err(SessionVerifyError::Malformed));
    }

    #[test]
    fn different_secret_fails_verification() {
        let codec_a = TokenCodec::new("0123456789abcdef0123456789abcdef");
        let codec_b = TokenCodec::new("fedcba9876543210fedcba9876543210");
        let token = codec_a.sign(&claims());
        assert_eq!(codec_b.verify(&token), Err(SessionVerifyError::InvalidSignature));
    }

    #[test]
    fn short_secret_is_rejected_at_startup() {
        assert!(matches!(
            validate_signing_secret("short"),
            Err(SigningSecretError::TooShort(_))
        ));
    }

    #[test]
    fn single_character_class_secret_is_rejected() {
        let secret = "a".repeat(40);
        assert!(matches!(
            validate_signing_secret(&secret),
            Err(SigningSecretError::LowEntropy)
        ));
    }

    #[test]
    fn mixed_class_secret_of_sufficient_length_is_accepted() {
        assert!(validate_signing_secret("Sup3r-Secret-Value-1234567890!!").is_ok());
    }
}
