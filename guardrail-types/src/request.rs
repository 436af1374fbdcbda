use serde::{Deserialize, Serialize};

/// `guardrail_validate_bash` input (§4.3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BashInput {
    pub project_slug: String,
    pub command: String,
}

/// `guardrail_validate_file_edit` input. `old_string` is empty for new files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEditInput {
    pub project_slug: String,
    pub path: String,
    #[serde(default)]
    pub old_string: String,
    pub new_string: String,
}

/// `guardrail_validate_git_operation` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOperationInput {
    pub project_slug: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `guardrail_validate_scope` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeInput {
    pub base: String,
    pub target: String,
}

/// `guardrail_validate_commit` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInput {
    pub message: String,
}

/// `guardrail_validate_push` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushInput {
    pub target_branch: String,
    #[serde(default)]
    pub is_force: bool,
    #[serde(default)]
    pub force_with_lease: bool,
}

/// `guardrail_validate_selection` / IDE selection input: arbitrary code, no
/// rule-category restriction beyond `selection`/`security`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionInput {
    pub project_slug: String,
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
}

/// `guardrail_pre_work_check` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreWorkCheckInput {
    pub project_slug: String,
    pub file_paths: Vec<String>,
}

/// One entry of a `guardrail_batch_validate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum BatchItem {
    ValidateBash(BashInput),
    ValidateFileEdit(FileEditInput),
    ValidateGitOperation(GitOperationInput),
    ValidateScope(ScopeInput),
    ValidateCommit(CommitInput),
    ValidatePush(PushInput),
}

/// `guardrail_batch_validate` input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchValidateInput {
    pub items: Vec<BatchItem>,
    /// Stop dispatching further items after the first `error`-severity
    /// result, if the caller opted in (§4.3: "short-circuits ... only if the
    /// caller requested it").
    #[serde(default)]
    pub short_circuit_on_error: bool,
}

/// Result of [`crate::rule::Rule`]-independent scope validation (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeResult {
    pub valid: bool,
    pub outside_scope: bool,
    pub message: String,
}

/// Result of commit message validation (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResult {
    pub valid: bool,
    pub commit_type: Option<String>,
    pub message: String,
}
