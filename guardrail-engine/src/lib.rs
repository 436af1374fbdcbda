//! The validation engine (§2, §4.3): rule cache, timeout-bounded pattern
//! matching, and the specialised scope/commit/push/pre-work validators.

pub mod cache;
pub mod engine;
pub mod pattern;
pub mod validators;

pub use cache::{RuleCache, RuleCacheError, Snapshot, DEFAULT_SNAPSHOT_TTL};
pub use engine::{BatchOutcome, QuickReferenceEntry, ValidationEngine};
pub use pattern::{CompiledRule, MatchOutcome, DEFAULT_MATCH_TIMEOUT, DEFAULT_MAX_INPUT_BYTES};
pub use validators::{validate_commit, validate_push, validate_scope, PushValidation};
