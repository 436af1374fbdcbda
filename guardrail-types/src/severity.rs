use serde::{Deserialize, Serialize};

/// Severity of a rule, and by extension of any violation it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Parse a severity value, defaulting to `warning` for anything unrecognised.
    /// Used by the ingester, which must never fail a whole block over a typo'd
    /// severity (§4.4).
    pub fn parse_or_warning(raw: &str) -> (Self, bool) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "error" => (Self::Error, false),
            "warning" => (Self::Warning, false),
            "info" => (Self::Info, false),
            _ => (Self::Warning, true),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Client-facing action a violation's severity maps to (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Client MUST refuse the action.
    Halt,
    /// Client SHOULD prompt the user.
    Confirm,
    /// Client MAY display, MUST NOT block.
    Log,
}

impl From<Severity> for Action {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Action::Halt,
            Severity::Warning => Action::Confirm,
            Severity::Info => Action::Log,
        }
    }
}

/// Severity of a known regression (`FailureRecord`), distinct from rule severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl FailureSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}
