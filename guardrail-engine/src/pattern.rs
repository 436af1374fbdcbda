//! Pattern matching with a hard time bound (§4.1 invariant: "matching a
//! single rule against a single input completes, or is abandoned, within a
//! bounded time"). A rule whose pattern runs catastrophically is treated as a
//! non-match for that request rather than stalling the whole batch.

use std::time::Duration;

use guardrail_types::Rule;
use regex::Regex;

/// Default per-pattern match timeout (§4.1: "ReDoS guard ... 100ms default").
pub const DEFAULT_MATCH_TIMEOUT: Duration = Duration::from_millis(100);

/// Default cap on the bytes of input text matched against a single rule
/// (§4.1: "content ... bounded ... 100 KiB default").
pub const DEFAULT_MAX_INPUT_BYTES: usize = 100 * 1024;

/// A rule with its pattern pre-compiled, ready to be matched repeatedly
/// without re-parsing the regex on every request.
#[derive(Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    regex: Regex,
}

impl CompiledRule {
    /// Compile `rule`'s pattern. On failure, returns the rule back to the
    /// caller alongside the error so the snapshot builder can log and skip
    /// it instead of failing the whole rebuild (§4.1: "a single bad pattern
    /// must not take the snapshot down").
    pub fn compile(rule: Rule) -> Result<Self, (Rule, regex::Error)> {
        match Regex::new(&rule.pattern) {
            Ok(regex) => Ok(Self { rule, regex }),
            Err(err) => Err((rule, err)),
        }
    }

    /// Whether `text` matches this rule's pattern, bounded by
    /// [`DEFAULT_MATCH_TIMEOUT`]. Text beyond [`DEFAULT_MAX_INPUT_BYTES`] is
    /// rejected by the caller before this is ever invoked.
    pub async fn is_match(&self, text: &str) -> MatchOutcome {
        let regex = self.regex.clone();
        let text = text.to_string();

        let probe = tokio::task::spawn_blocking(move || regex.is_match(&text));

        match tokio::time::timeout(DEFAULT_MATCH_TIMEOUT, probe).await {
            Ok(Ok(matched)) => {
                if matched {
                    MatchOutcome::Matched
                } else {
                    MatchOutcome::NoMatch
                }
            }
            Ok(Err(_join_error)) => MatchOutcome::Aborted,
            Err(_timeout) => {
                tracing::warn!(
                    rule = %self.rule.short_id,
                    "pattern match exceeded time bound, treating as suspected ReDoS"
                );
                MatchOutcome::TimedOut
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched,
    NoMatch,
    /// The match thread panicked; treated like `NoMatch` but logged loudly.
    Aborted,
    /// Exceeded [`DEFAULT_MATCH_TIMEOUT`]; treated like `NoMatch` so one
    /// pathological rule can't block validation (§4.1).
    TimedOut,
}

impl MatchOutcome {
    pub fn matched(self) -> bool {
        matches!(self, Self::Matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_types::{RuleCategory, Severity};

    fn sample_rule(pattern: &str) -> Rule {
        Rule {
            id: uuid::Uuid::new_v4(),
            short_id: "PREVENT-1".to_string(),
            name: "sample".to_string(),
            pattern: pattern.to_string(),
            pattern_hash: "hash".to_string(),
            message: "blocked".to_string(),
            severity: Severity::Error,
            category: RuleCategory::Bash,
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn matches_when_pattern_present() {
        let compiled = CompiledRule::compile(sample_rule(r"rm\s+-rf\s+/")).unwrap();
        assert!(compiled.is_match("rm -rf /").await.matched());
    }

    #[tokio::test]
    async fn no_match_when_pattern_absent() {
        let compiled = CompiledRule::compile(sample_rule(r"rm\s+-rf\s+/")).unwrap();
        assert!(!compiled.is_match("ls -la").await.matched());
    }

    #[tokio::test]
    async fn catastrophic_pattern_times_out_instead_of_hanging() {
        let compiled = CompiledRule::compile(sample_rule(r"(a+)+$")).unwrap();
        let input = "a".repeat(40).chars().collect::<String>() + "!";
        let outcome = compiled.is_match(&input).await;
        assert!(matches!(outcome, MatchOutcome::TimedOut | MatchOutcome::NoMatch));
    }

    #[test]
    fn invalid_pattern_is_rejected_at_compile() {
        let err = CompiledRule::compile(sample_rule("(unclosed")).unwrap_err();
        assert!(err.1.to_string().len() > 0);
    }
}
