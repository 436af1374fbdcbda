use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row per directory scan performed by the rule ingester (§3, §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: uuid::Uuid,
    pub source_label: String,
    pub status: IngestStatus,
    pub processed: usize,
    pub added: usize,
    pub updated: usize,
    pub disabled: usize,
    pub errors: Vec<IngestError>,
    /// Per-rule record of every add/update/disable this job performed, in
    /// processing order. Exists so a caller (the `ingest` CLI command, a
    /// future hot-reload path) can audit-log each rule change individually
    /// rather than just the aggregate counters above (§4.6).
    pub changes: Vec<RuleChange>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestJob {
    pub fn new(source_label: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            source_label: source_label.into(),
            status: IngestStatus::Running,
            processed: 0,
            added: 0,
            updated: 0,
            disabled: 0,
            errors: Vec::new(),
            changes: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self, status: IngestStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestError {
    pub short_id: Option<String>,
    pub message: String,
}

/// One add/update/disable performed during reconciliation (§4.4, §4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleChange {
    pub short_id: String,
    pub action: RuleChangeAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleChangeAction {
    Added,
    Updated,
    Disabled,
}
