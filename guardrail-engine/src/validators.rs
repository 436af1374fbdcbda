//! Specialised validators (§4.3): scope, commit message, push, and
//! pre-work/regression check. Each is a thin deterministic policy rather
//! than a rule lookup, except pre-work which reads the failure store.

use std::sync::LazyLock;

use guardrail_commons::check_scope;
use guardrail_store::{Backends, BreakerCallError};
use guardrail_types::{CommitResult, FailureRecord, PushInput, ScopeInput, ScopeResult};
use regex::Regex;

const COMMIT_TYPES: &[&str] = &[
    "feat", "fix", "docs", "style", "refactor", "perf", "test", "build", "ci", "chore", "revert",
];

const MAX_COMMIT_SUBJECT_LEN: usize = 72;

static COMMIT_MESSAGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<type>[a-z]+)(?:\((?P<scope>[^)]*)\))?: (?P<subject>.+)$")
        .expect("commit message pattern is valid")
});

/// `guardrail_validate_scope` (§4.3: symlink-free normalization, `== base`
/// or under `base/`).
pub fn validate_scope(input: &ScopeInput) -> ScopeResult {
    let base = std::path::Path::new(&input.base);
    let target = std::path::Path::new(&input.target);
    let verdict = check_scope(base, target);

    ScopeResult {
        valid: verdict.in_scope,
        outside_scope: !verdict.in_scope,
        message: verdict.message,
    }
}

/// `guardrail_validate_commit` (§4.3: conventional-commit-shaped header,
/// subject non-empty and ≤72 bytes).
pub fn validate_commit(message: &str) -> CommitResult {
    let Some(captures) = COMMIT_MESSAGE_REGEX.captures(message) else {
        return CommitResult {
            valid: false,
            commit_type: None,
            message: "commit message does not match `<type>(<scope>): <subject>`".to_string(),
        };
    };

    let commit_type = &captures["type"];
    let subject = &captures["subject"];

    if !COMMIT_TYPES.contains(&commit_type) {
        return CommitResult {
            valid: false,
            commit_type: None,
            message: format!("commit type `{commit_type}` is not one of the recognised types"),
        };
    }

    if subject.is_empty() || subject.len() > MAX_COMMIT_SUBJECT_LEN {
        return CommitResult {
            valid: false,
            commit_type: Some(commit_type.to_string()),
            message: format!("subject must be non-empty and at most {MAX_COMMIT_SUBJECT_LEN} bytes"),
        };
    }

    CommitResult {
        valid: true,
        commit_type: Some(commit_type.to_string()),
        message: "commit message is well-formed".to_string(),
    }
}

/// `guardrail_validate_push` (§4.3: force-push without lease is an error;
/// pushing a protected branch without force is a warning).
pub fn validate_push(input: &PushInput, protected_branches: &[String]) -> PushValidation {
    if input.is_force && !input.force_with_lease {
        return PushValidation {
            valid: false,
            warning: false,
            message: format!(
                "force push to `{}` without --force-with-lease is not allowed",
                input.target_branch
            ),
        };
    }

    if protected_branches.iter().any(|b| b == &input.target_branch) {
        return PushValidation {
            valid: true,
            warning: true,
            message: format!("`{}` is a protected branch", input.target_branch),
        };
    }

    PushValidation {
        valid: true,
        warning: false,
        message: "push is permitted".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PushValidation {
    pub valid: bool,
    pub warning: bool,
    pub message: String,
}

/// `guardrail_pre_work_check` (§4.3): active failures whose `affected_files`
/// intersects `file_paths`. Read through the store breaker; an open breaker
/// surfaces as `BACKEND_UNAVAILABLE` to the caller rather than silently
/// returning an empty list.
pub async fn pre_work_check(
    backends: &Backends,
    project_slug: &str,
    file_paths: &[String],
) -> Result<Vec<FailureRecord>, BreakerCallError<guardrail_store::StoreError>> {
    let store = backends.rule_store.clone();
    let slug = project_slug.to_string();
    let failures = backends
        .breakers
        .store
        .call(|| async move { store.load_active_failures(&slug).await })
        .await?;

    Ok(failures
        .into_iter()
        .filter(|failure| {
            failure
                .affected_files
                .iter()
                .any(|affected| file_paths.iter().any(|p| p == affected))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_types::FailureStatus;

    #[test]
    fn reflexive_base_is_in_scope_of_itself() {
        let result = validate_scope(&ScopeInput {
            base: "/app/src".to_string(),
            target: "/app/src".to_string(),
        });
        assert!(result.valid);
        assert!(!result.outside_scope);
    }

    #[test]
    fn out_of_bounds_target_is_rejected_without_rule_lookup() {
        let result = validate_scope(&ScopeInput {
            base: "/app/src".to_string(),
            target: "/etc/passwd".to_string(),
        });
        assert!(!result.valid);
        assert!(result.outside_scope);
    }

    #[test]
    fn accepts_well_formed_commit_message() {
        let result = validate_commit("feat(engine): add ReDoS guard");
        assert!(result.valid);
        assert_eq!(result.commit_type.as_deref(), Some("feat"));
    }

    #[test]
    fn rejects_unrecognised_commit_type() {
        let result = validate_commit("wip: work in progress");
        assert!(!result.valid);
    }

    #[test]
    fn rejects_commit_subject_over_length_cap() {
        let subject = "a".repeat(MAX_COMMIT_SUBJECT_LEN + 1);
        let result = validate_commit(&format!("fix: {subject}"));
        assert!(!result.valid);
    }

    #[test]
    fn force_push_without_lease_is_rejected() {
        let result = validate_push(
            &PushInput {
                target_branch: "main".to_string(),
                is_force: true,
                force_with_lease: false,
            },
            &[],
        );
        assert!(!result.valid);
    }

    #[test]
    fn push_to_protected_branch_warns_but_is_valid() {
        let result = validate_push(
            &PushInput {
                target_branch: "main".to_string(),
                is_force: false,
                force_with_lease: false,
            },
            &["main".to_string()],
        );
        assert!(result.valid);
        assert!(result.warning);
    }

    #[tokio::test]
    async fn pre_work_check_matches_on_affected_files() {
        let store = std::sync::Arc::new(guardrail_store::InMemoryRuleStore::new());
        store
            .insert_failure(
                "demo",
                FailureRecord {
                    short_id: "FAIL-1".to_string(),
                    category: guardrail_types::RuleCategory::FileEdit,
                    severity: guardrail_types::FailureSeverity::High,
                    message: "known flaky parser".to_string(),
                    root_cause: "unhandled edge case".to_string(),
                    affected_files: vec!["src/parser.rs".to_string()],
                    regression_pattern: None,
                    status: FailureStatus::Active,
                    project_slug: Some("demo".to_string()),
                    created_at: chrono::Utc::now(),
                    updated_at: chrono::Utc::now(),
                },
            )
            .await
            .unwrap();

        let backends = Backends::new(store, std::sync::Arc::new(guardrail_store::InMemoryCache::new()));
        let hits = pre_work_check(&backends, "demo", &["src/parser.rs".to_string()])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].short_id, "FAIL-1");
    }
}
