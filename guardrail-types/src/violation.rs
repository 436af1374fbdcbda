use serde::{Deserialize, Serialize};

use crate::category::InputCategory;
use crate::severity::{Action, Severity};

/// A single finding produced by the validation engine (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub action: Action,
    pub message: String,
    pub category: InputCategory,
    pub suggested_alternative: Option<String>,
    pub documentation_uri: Option<String>,
    /// Truncated excerpt of the matched text. Secret-bearing excerpts are
    /// masked before this field is populated (§4.3).
    pub excerpt: String,
}

impl Violation {
    /// The synthetic violation returned when the engine has no usable rule
    /// snapshot at all (§4.3, §8).
    pub fn validation_error(message: impl Into<String>, category: InputCategory) -> Self {
        Self {
            rule_id: "VALIDATION-ERROR".to_string(),
            rule_name: "Validation Unavailable".to_string(),
            severity: Severity::Error,
            action: Action::Halt,
            message: message.into(),
            category,
            suggested_alternative: None,
            documentation_uri: None,
            excerpt: String::new(),
        }
    }
}

/// Metadata accompanying a validation verdict (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationMeta {
    pub checked_at: chrono::DateTime<chrono::Utc>,
    pub rules_evaluated: usize,
    pub duration_ms: u64,
    pub cached: bool,
    #[serde(default)]
    pub stale: bool,
}

/// The complete output of a validation call (§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<Violation>,
    pub meta: ValidationMeta,
}

impl ValidationResult {
    /// §8 universal property: `valid == (violations with severity==error is empty)`.
    pub fn from_violations(
        violations: Vec<Violation>,
        rules_evaluated: usize,
        duration_ms: u64,
        cached: bool,
        stale: bool,
    ) -> Self {
        let valid = !violations.iter().any(|v| v.severity == Severity::Error);
        Self {
            valid,
            violations,
            meta: ValidationMeta {
                checked_at: chrono::Utc::now(),
                rules_evaluated,
                duration_ms,
                cached,
                stale,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule_id: "R-1".into(),
            rule_name: "rule".into(),
            severity,
            action: severity.into(),
            message: "m".into(),
            category: InputCategory::Bash,
            suggested_alternative: None,
            documentation_uri: None,
            excerpt: String::new(),
        }
    }

    #[test]
    fn valid_iff_no_error_violations() {
        let with_error = ValidationResult::from_violations(
            vec![violation(Severity::Warning), violation(Severity::Error)],
            2,
            1,
            false,
            false,
        );
        assert!(!with_error.valid);

        let without_error = ValidationResult::from_violations(
            vec![violation(Severity::Warning), violation(Severity::Info)],
            2,
            1,
            false,
            false,
        );
        assert!(without_error.valid);
    }
}
