//! Shared, dependency-light utilities used across the guardrail workspace:
//! scope/path normalization, secrets scanning, and content hashing.

pub mod hash;
pub mod scope;
pub mod secrets;

pub use hash::stable_hash;
pub use scope::{check_scope, normalize_path, ScopeVerdict};
pub use secrets::{scan as scan_secrets, SecretHit};
