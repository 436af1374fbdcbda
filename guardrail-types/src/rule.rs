use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::RuleCategory;
use crate::severity::Severity;

/// Maximum length, in bytes, of a rule's pattern text (§3 invariant: "bounded
/// in length").
pub const MAX_PATTERN_LEN: usize = 2_048;

/// An administrator-authored rule: a pattern with severity and category that
/// the validation engine matches inputs against (GLOSSARY).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Service-assigned unique id.
    pub id: uuid::Uuid,
    /// Human-authored short id, e.g. `PREVENT-017`. Unique (§3 invariant).
    pub short_id: String,
    pub name: String,
    pub pattern: String,
    /// Stable hash of `pattern`, used by the ingester for change detection.
    pub pattern_hash: String,
    pub message: String,
    pub severity: Severity,
    pub category: RuleCategory,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Rule {
    /// Validate the invariants from §3: pattern compiles, is non-empty, and is
    /// bounded in length. Severity/category are invariants of the type system
    /// here since both are enums, so only the pattern needs runtime checking.
    pub fn validate_pattern(pattern: &str) -> Result<(), RulePatternError> {
        if pattern.is_empty() {
            return Err(RulePatternError::Empty);
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(RulePatternError::TooLong {
                len: pattern.len(),
                max: MAX_PATTERN_LEN,
            });
        }
        regex::Regex::new(pattern).map_err(|source| RulePatternError::DoesNotCompile {
            pattern: pattern.to_string(),
            source: source.to_string(),
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RulePatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("pattern is {len} bytes, exceeds the {max}-byte cap")]
    TooLong { len: usize, max: usize },
    #[error("pattern `{pattern}` does not compile: {source}")]
    DoesNotCompile { pattern: String, source: String },
}

/// A known regression read by the validator's pre-work check (§4.3, §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub short_id: String,
    pub category: RuleCategory,
    pub severity: crate::severity::FailureSeverity,
    pub message: String,
    pub root_cause: String,
    pub affected_files: Vec<String>,
    pub regression_pattern: Option<String>,
    pub status: FailureStatus,
    pub project_slug: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStatus {
    Active,
    Resolved,
    Deprecated,
}

impl FailureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Deprecated => "deprecated",
        }
    }
}

/// A centrally-administered project a session is bound to (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub slug: String,
    pub name: String,
    pub preamble: Option<String>,
    pub active_rules: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Project {
    /// URL-safe slug check: lowercase ascii alphanumerics and hyphens only,
    /// matching the convention the teacher's `slug` helpers enforce.
    pub fn is_valid_slug(slug: &str) -> bool {
        !slug.is_empty()
            && slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !slug.starts_with('-')
            && !slug.ends_with('-')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_pattern() {
        assert!(matches!(
            Rule::validate_pattern(""),
            Err(RulePatternError::Empty)
        ));
    }

    #[test]
    fn rejects_oversized_pattern() {
        let pattern = "a".repeat(MAX_PATTERN_LEN + 1);
        assert!(matches!(
            Rule::validate_pattern(&pattern),
            Err(RulePatternError::TooLong { .. })
        ));
    }

    #[test]
    fn rejects_pattern_that_does_not_compile() {
        assert!(matches!(
            Rule::validate_pattern("(unclosed"),
            Err(RulePatternError::DoesNotCompile { .. })
        ));
    }

    #[test]
    fn accepts_valid_pattern() {
        assert!(Rule::validate_pattern(r"git\s+push\s+--force").is_ok());
    }

    #[test]
    fn slug_validation() {
        assert!(Project::is_valid_slug("demo-project"));
        assert!(!Project::is_valid_slug("Demo_Project"));
        assert!(!Project::is_valid_slug("-leading-hyphen"));
        assert!(!Project::is_valid_slug(""));
    }
}
