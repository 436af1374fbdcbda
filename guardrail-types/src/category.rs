use serde::{Deserialize, Serialize};

/// The kind of input a validation request carries (§4.3, GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputCategory {
    Bash,
    FileEdit,
    Git,
    Selection,
    Scope,
    Commit,
}

impl InputCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::FileEdit => "file_edit",
            Self::Git => "git",
            Self::Selection => "selection",
            Self::Scope => "scope",
            Self::Commit => "commit",
        }
    }
}

/// The category a rule declares it applies to. A strict superset of
/// `InputCategory`: rules may also target `security` content (secrets, free-form
/// text) or `all` categories at once (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    Bash,
    Git,
    FileEdit,
    Security,
    All,
    /// Catch-all for ingested rules whose category did not parse into one of
    /// the enumerated values (§4.4: "category not in the set defaults to
    /// `general`").
    General,
}

impl RuleCategory {
    /// Parse a rule category from ingested markdown, defaulting to `general`
    /// for anything unrecognised rather than failing the whole block (§4.4).
    pub fn parse_or_general(raw: &str) -> Self {
        match normalize(raw).as_str() {
            "bash" | "shell" | "command" => Self::Bash,
            "git" | "git_operation" | "vcs" => Self::Git,
            "file_edit" | "file" | "edit" => Self::FileEdit,
            "security" | "secret" | "secrets" => Self::Security,
            "all" | "*" => Self::All,
            _ => Self::General,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Git => "git",
            Self::FileEdit => "file_edit",
            Self::Security => "security",
            Self::All => "all",
            Self::General => "general",
        }
    }

    /// Whether a rule declaring this category applies to the given input
    /// category. `all` always applies; `security` applies to any input that
    /// carries free-form content (file edit, selection) since that is what the
    /// secrets scanner and security-tagged rules target (§4.3).
    pub fn applies_to(self, input: InputCategory) -> bool {
        match self {
            Self::All => true,
            Self::Bash => matches!(input, InputCategory::Bash),
            Self::Git => matches!(input, InputCategory::Git),
            Self::FileEdit => matches!(input, InputCategory::FileEdit),
            Self::Security => matches!(input, InputCategory::FileEdit | InputCategory::Selection),
            Self::General => false,
        }
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_aliases_map_to_canonical_categories() {
        assert_eq!(RuleCategory::parse_or_general("shell"), RuleCategory::Bash);
        assert_eq!(
            RuleCategory::parse_or_general("git_operation"),
            RuleCategory::Git
        );
        assert_eq!(RuleCategory::parse_or_general("*"), RuleCategory::All);
    }

    #[test]
    fn unknown_category_defaults_to_general() {
        assert_eq!(
            RuleCategory::parse_or_general("frobnicate"),
            RuleCategory::General
        );
    }

    #[test]
    fn all_category_applies_to_every_input() {
        for input in [
            InputCategory::Bash,
            InputCategory::FileEdit,
            InputCategory::Git,
            InputCategory::Selection,
            InputCategory::Scope,
            InputCategory::Commit,
        ] {
            assert!(RuleCategory::All.applies_to(input));
        }
    }

    #[test]
    fn general_category_applies_to_nothing() {
        assert!(!RuleCategory::General.applies_to(InputCategory::Bash));
    }
}
