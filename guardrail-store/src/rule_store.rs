//! Rule and failure store adapter (§2, §4.2). The engine's rule cache talks
//! to this trait only; the postgres-backed implementation and the in-memory
//! test double are interchangeable behind it.

use std::collections::HashMap;

use async_trait::async_trait;
use guardrail_types::{FailureRecord, Project, Rule};
use parking_lot::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("project `{0}` not found")]
    ProjectNotFound(String),
    #[error("rule `{0}` not found")]
    RuleNotFound(String),
    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Everything the engine needs to pull from durable storage to build a
/// compiled rule snapshot for a project (§4.1).
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn load_project(&self, slug: &str) -> Result<Project, StoreError>;

    async fn load_active_rules(&self, slug: &str) -> Result<Vec<Rule>, StoreError>;

    /// All rules for `slug`, enabled or not. Used by the ingester to compare
    /// a parsed block's pattern hash against whatever is currently stored,
    /// including rules that are currently disabled (§4.4).
    async fn load_all_rules(&self, slug: &str) -> Result<Vec<Rule>, StoreError>;

    async fn upsert_rule(&self, slug: &str, rule: Rule) -> Result<(), StoreError>;

    async fn disable_rule(&self, slug: &str, short_id: &str) -> Result<(), StoreError>;

    async fn load_active_failures(&self, slug: &str) -> Result<Vec<FailureRecord>, StoreError>;

    async fn insert_failure(&self, slug: &str, failure: FailureRecord) -> Result<(), StoreError>;
}

/// In-memory store used by engine/server tests and by local development
/// without a postgres instance.
#[derive(Default)]
pub struct InMemoryRuleStore {
    projects: RwLock<HashMap<String, Project>>,
    rules: RwLock<HashMap<String, Vec<Rule>>>,
    failures: RwLock<HashMap<String, Vec<FailureRecord>>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_project(&self, project: Project) {
        self.projects.write().insert(project.slug.clone(), project);
    }

    pub fn seed_rule(&self, slug: &str, rule: Rule) {
        self.rules.write().entry(slug.to_string()).or_default().push(rule);
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn load_project(&self, slug: &str) -> Result<Project, StoreError> {
        self.projects
            .read()
            .get(slug)
            .cloned()
            .ok_or_else(|| StoreError::ProjectNotFound(slug.to_string()))
    }

    async fn load_active_rules(&self, slug: &str) -> Result<Vec<Rule>, StoreError> {
        Ok(self
            .rules
            .read()
            .get(slug)
            .map(|rules| rules.iter().filter(|r| r.enabled).cloned().collect())
            .unwrap_or_default())
    }

    async fn load_all_rules(&self, slug: &str) -> Result<Vec<Rule>, StoreError> {
        Ok(self.rules.read().get(slug).cloned().unwrap_or_default())
    }

    async fn upsert_rule(&self, slug: &str, rule: Rule) -> Result<(), StoreError> {
        let mut rules = self.rules.write();
        let bucket = rules.entry(slug.to_string()).or_default();
        if let Some(existing) = bucket.iter_mut().find(|r| r.short_id == rule.short_id) {
            *existing = rule;
        } else {
            bucket.push(rule);
        }
        Ok(())
    }

    async fn disable_rule(&self, slug: &str, short_id: &str) -> Result<(), StoreError> {
        let mut rules = self.rules.write();
        let bucket = rules
            .get_mut(slug)
            .ok_or_else(|| StoreError::RuleNotFound(short_id.to_string()))?;
        let rule = bucket
            .iter_mut()
            .find(|r| r.short_id == short_id)
            .ok_or_else(|| StoreError::RuleNotFound(short_id.to_string()))?;
        rule.enabled = false;
        Ok(())
    }

    async fn load_active_failures(&self, slug: &str) -> Result<Vec<FailureRecord>, StoreError> {
        Ok(self
            .failures
            .read()
            .get(slug)
            .map(|failures| {
                failures
                    .iter()
                    .filter(|f| f.status == guardrail_types::FailureStatus::Active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_failure(&self, slug: &str, failure: FailureRecord) -> Result<(), StoreError> {
        self.failures
            .write()
            .entry(slug.to_string())
            .or_default()
            .push(failure);
        Ok(())
    }
}

/// Postgres-backed store (§4.2 durable rule/failure persistence). Every
/// query is scoped to `project_slug` so the rule cache can never leak a
/// project's rules into another's snapshot.
pub struct PostgresRuleStore {
    pool: sqlx::PgPool,
}

impl PostgresRuleStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Backend(err.into()))?;
        Ok(Self::new(pool))
    }

    /// Run the bundled migrations. Called once at startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Backend(err.into()))
    }
}

#[async_trait]
impl RuleStore for PostgresRuleStore {
    async fn load_project(&self, slug: &str) -> Result<Project, StoreError> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"SELECT slug, name, preamble, active_rules, metadata
               FROM projects WHERE slug = $1"#,
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;

        let row = row.ok_or_else(|| StoreError::ProjectNotFound(slug.to_string()))?;

        Ok(Project {
            slug: row.slug,
            name: row.name,
            preamble: row.preamble,
            active_rules: row.active_rules,
            metadata: row
                .metadata
                .and_then(|value| value.as_object().cloned())
                .unwrap_or_default(),
        })
    }

    async fn load_active_rules(&self, slug: &str) -> Result<Vec<Rule>, StoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"SELECT id, short_id, name, pattern, pattern_hash, message,
                      severity, category, enabled, created_at, updated_at
               FROM rules WHERE project_slug = $1 AND enabled"#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;

        Ok(rows.into_iter().map(RuleRow::into_rule).collect())
    }

    async fn load_all_rules(&self, slug: &str) -> Result<Vec<Rule>, StoreError> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"SELECT id, short_id, name, pattern, pattern_hash, message,
                      severity, category, enabled, created_at, updated_at
               FROM rules WHERE project_slug = $1"#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;

        Ok(rows.into_iter().map(RuleRow::into_rule).collect())
    }

    async fn upsert_rule(&self, slug: &str, rule: Rule) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO rules
                 (id, project_slug, short_id, name, pattern, pattern_hash,
                  message, severity, category, enabled, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               ON CONFLICT (project_slug, short_id) DO UPDATE SET
                 name = EXCLUDED.name,
                 pattern = EXCLUDED.pattern,
                 pattern_hash = EXCLUDED.pattern_hash,
                 message = EXCLUDED.message,
                 severity = EXCLUDED.severity,
                 category = EXCLUDED.category,
                 enabled = EXCLUDED.enabled,
                 updated_at = EXCLUDED.updated_at"#,
        )
        .bind(rule.id)
        .bind(slug)
        .bind(rule.short_id)
        .bind(rule.name)
        .bind(rule.pattern)
        .bind(rule.pattern_hash)
        .bind(rule.message)
        .bind(rule.severity.as_str())
        .bind(rule.category.as_str())
        .bind(rule.enabled)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;
        Ok(())
    }

    async fn disable_rule(&self, slug: &str, short_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"UPDATE rules SET enabled = false, updated_at = now()
               WHERE project_slug = $1 AND short_id = $2"#,
        )
        .bind(slug)
        .bind(short_id)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RuleNotFound(short_id.to_string()));
        }
        Ok(())
    }

    async fn load_active_failures(&self, slug: &str) -> Result<Vec<FailureRecord>, StoreError> {
        let rows: Vec<FailureRow> = sqlx::query_as(
            r#"SELECT short_id, category, severity, message, root_cause,
                      affected_files, regression_pattern, status,
                      project_slug, created_at, updated_at
               FROM failures WHERE project_slug = $1 AND status = 'active'"#,
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;

        Ok(rows.into_iter().map(FailureRow::into_record).collect())
    }

    async fn insert_failure(&self, slug: &str, failure: FailureRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO failures
                 (short_id, project_slug, category, severity, message,
                  root_cause, affected_files, regression_pattern, status,
                  created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(failure.short_id)
        .bind(Some(slug.to_string()))
        .bind(failure.category.as_str())
        .bind(failure.severity.as_str())
        .bind(failure.message)
        .bind(failure.root_cause)
        .bind(&failure.affected_files)
        .bind(failure.regression_pattern)
        .bind(failure.status.as_str())
        .bind(failure.created_at)
        .bind(failure.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|err| StoreError::Backend(err.into()))?;
        Ok(())
    }
}

/// Row shape mirroring the `projects` table for `sqlx::FromRow` decoding.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    slug: String,
    name: String,
    preamble: Option<String>,
    active_rules: Vec<String>,
    metadata: Option<serde_json::Value>,
}

/// Row shape mirroring the `rules` table; kept separate from the wire/domain
/// [`Rule`] type so storage-layer column choices don't leak upward.
#[derive(sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    short_id: String,
    name: String,
    pattern: String,
    pattern_hash: String,
    message: String,
    severity: String,
    category: String,
    enabled: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl RuleRow {
    fn into_rule(self) -> Rule {
        let (severity, _) = guardrail_types::Severity::parse_or_warning(&self.severity);
        let category = guardrail_types::RuleCategory::parse_or_general(&self.category);
        Rule {
            id: self.id,
            short_id: self.short_id,
            name: self.name,
            pattern: self.pattern,
            pattern_hash: self.pattern_hash,
            message: self.message,
            severity,
            category,
            enabled: self.enabled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FailureRow {
    short_id: String,
    category: String,
    severity: String,
    message: String,
    root_cause: String,
    affected_files: Vec<String>,
    regression_pattern: Option<String>,
    status: String,
    project_slug: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl FailureRow {
    fn into_record(self) -> FailureRecord {
        use guardrail_types::{FailureSeverity, FailureStatus, RuleCategory};

        let severity = match self.severity.as_str() {
            "critical" => FailureSeverity::Critical,
            "high" => FailureSeverity::High,
            "low" => FailureSeverity::Low,
            _ => FailureSeverity::Medium,
        };
        let status = match self.status.as_str() {
            "resolved" => FailureStatus::Resolved,
            "deprecated" => FailureStatus::Deprecated,
            _ => FailureStatus::Active,
        };

        FailureRecord {
            short_id: self.short_id,
            category: RuleCategory::parse_or_general(&self.category),
            severity,
            message: self.message,
            root_cause: self.root_cause,
            affected_files: self.affected_files,
            regression_pattern: self.regression_pattern,
            status,
            project_slug: self.project_slug,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_types::{RuleCategory, Severity};

    fn sample_rule(short_id: &str) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            short_id: short_id.to_string(),
            name: "no rm rf".to_string(),
            pattern: r"rm\s+-rf\s+/".to_string(),
            pattern_hash: "hash".to_string(),
            message: "refuses to run".to_string(),
            severity: Severity::Error,
            category: RuleCategory::Bash,
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let store = InMemoryRuleStore::new();
        store.upsert_rule("demo", sample_rule("PREVENT-1")).await.unwrap();

        let rules = store.load_active_rules("demo").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].short_id, "PREVENT-1");
    }

    #[tokio::test]
    async fn disabled_rules_are_excluded_from_active_load() {
        let store = InMemoryRuleStore::new();
        store.upsert_rule("demo", sample_rule("PREVENT-1")).await.unwrap();
        store.disable_rule("demo", "PREVENT-1").await.unwrap();

        assert!(store.load_active_rules("demo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disable_missing_rule_errors() {
        let store = InMemoryRuleStore::new();
        let err = store.disable_rule("demo", "PREVENT-404").await.unwrap_err();
        assert!(matches!(err, StoreError::RuleNotFound(_)));
    }
}
