//! Reconciliation (§4.4): for each parsed block, insert/update/re-enable
//! against the store, comparing against the existing rule's pattern hash so
//! an unchanged rule is left alone; afterwards disable any enabled rule that
//! did not appear in this run's set of short ids.

use std::collections::{HashMap, HashSet};

use guardrail_store::RuleStore;
use guardrail_types::{IngestError, IngestJob, Rule, RuleCategory, RuleChange, RuleChangeAction, Severity};

use crate::parser::ParsedRuleBlock;

/// Ingest every block parsed from `source`, reconciling against `store` for
/// `project_slug`, and return the completed job summary.
pub async fn ingest_source(
    store: &dyn RuleStore,
    project_slug: &str,
    source_label: &str,
    source: &str,
) -> IngestJob {
    let mut job = IngestJob::new(source_label.to_string());
    let blocks = crate::parser::parse_blocks(source);

    let existing: HashMap<String, Rule> = match store.load_all_rules(project_slug).await {
        Ok(rules) => rules.into_iter().map(|r| (r.short_id.clone(), r)).collect(),
        Err(err) => {
            tracing::warn!(error = %err, "could not load existing rules before ingest, treating as empty");
            HashMap::new()
        }
    };
    let existing_enabled: HashSet<String> = existing
        .values()
        .filter(|r| r.enabled)
        .map(|r| r.short_id.clone())
        .collect();

    let mut seen = HashSet::new();

    for block in &blocks {
        job.processed += 1;
        seen.insert(block.short_id.clone());

        match reconcile_block(store, project_slug, block, existing.get(&block.short_id)).await {
            Ok(Outcome::Added) => {
                job.added += 1;
                job.changes.push(RuleChange {
                    short_id: block.short_id.clone(),
                    action: RuleChangeAction::Added,
                });
            }
            Ok(Outcome::Updated) => {
                job.updated += 1;
                job.changes.push(RuleChange {
                    short_id: block.short_id.clone(),
                    action: RuleChangeAction::Updated,
                });
            }
            Ok(Outcome::Unchanged) => {}
            Err(err) => job.errors.push(IngestError {
                short_id: Some(block.short_id.clone()),
                message: err,
            }),
        }
    }

    for short_id in existing_enabled.difference(&seen) {
        match store.disable_rule(project_slug, short_id).await {
            Ok(()) => {
                job.disabled += 1;
                job.changes.push(RuleChange {
                    short_id: short_id.clone(),
                    action: RuleChangeAction::Disabled,
                });
            }
            Err(err) => job.errors.push(IngestError {
                short_id: Some(short_id.clone()),
                message: err.to_string(),
            }),
        }
    }

    job.finish(if job.errors.is_empty() {
        guardrail_types::IngestStatus::Completed
    } else {
        guardrail_types::IngestStatus::Failed
    });

    job
}

enum Outcome {
    Added,
    Updated,
    Unchanged,
}

async fn reconcile_block(
    store: &dyn RuleStore,
    project_slug: &str,
    block: &ParsedRuleBlock,
    existing: Option<&Rule>,
) -> Result<Outcome, String> {
    let pattern = block
        .pattern
        .clone()
        .ok_or_else(|| "block has no `Pattern` metadata".to_string())?;

    Rule::validate_pattern(&pattern).map_err(|err| err.to_string())?;

    let Some(existing) = existing else {
        let (severity, severity_defaulted) = match &block.severity_raw {
            Some(raw) => Severity::parse_or_warning(raw),
            None => (Severity::Warning, true),
        };
        if severity_defaulted {
            tracing::warn!(
                rule = %block.short_id,
                "severity missing or unrecognised, defaulting to warning"
            );
        }
        let category = match &block.category_raw {
            Some(raw) => RuleCategory::parse_or_general(raw),
            None => RuleCategory::General,
        };
        let message = block.message.clone().unwrap_or_else(|| block.name.clone());
        let now = chrono::Utc::now();

        store
            .upsert_rule(
                project_slug,
                Rule {
                    id: uuid::Uuid::new_v4(),
                    short_id: block.short_id.clone(),
                    name: block.name.clone(),
                    pattern,
                    pattern_hash: block.block_hash.clone(),
                    message,
                    severity,
                    category,
                    enabled: true,
                    created_at: now,
                    updated_at: now,
                },
            )
            .await
            .map_err(|err| err.to_string())?;
        return Ok(Outcome::Added);
    };

    if existing.pattern_hash == block.block_hash {
        if existing.enabled {
            return Ok(Outcome::Unchanged);
        }

        let mut rule = existing.clone();
        rule.enabled = true;
        rule.updated_at = chrono::Utc::now();
        store
            .upsert_rule(project_slug, rule)
            .await
            .map_err(|err| err.to_string())?;
        return Ok(Outcome::Updated);
    }

    let (severity, severity_defaulted) = match &block.severity_raw {
        Some(raw) => Severity::parse_or_warning(raw),
        None => (Severity::Warning, true),
    };
    if severity_defaulted {
        tracing::warn!(
            rule = %block.short_id,
            "severity missing or unrecognised, defaulting to warning"
        );
    }
    let category = match &block.category_raw {
        Some(raw) => RuleCategory::parse_or_general(raw),
        None => RuleCategory::General,
    };
    let message = block.message.clone().unwrap_or_else(|| block.name.clone());

    store
        .upsert_rule(
            project_slug,
            Rule {
                id: existing.id,
                short_id: block.short_id.clone(),
                name: block.name.clone(),
                pattern,
                pattern_hash: block.block_hash.clone(),
                message,
                severity,
                category,
                enabled: true,
                created_at: existing.created_at,
                updated_at: chrono::Utc::now(),
            },
        )
        .await
        .map_err(|err| err.to_string())?;
    Ok(Outcome::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_store::InMemoryRuleStore;

    const RULE_MD: &str = "\
## PREVENT-001: No Force Push

**Pattern:** `git\\s+push\\s+--force`
**Message:** Force pushing is not allowed.
**Severity:** error
**Category:** git
";

    #[tokio::test]
    async fn first_ingest_adds_rule() {
        let store = InMemoryRuleStore::new();
        let job = ingest_source(&store, "demo", "rules.md", RULE_MD).await;
        assert_eq!(job.added, 1);
        assert_eq!(job.updated, 0);
        assert!(job.errors.is_empty());

        let rules = store.load_active_rules("demo").await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].short_id, "PREVENT-001");
    }

    #[tokio::test]
    async fn second_identical_ingest_is_a_no_op() {
        let store = InMemoryRuleStore::new();
        ingest_source(&store, "demo", "rules.md", RULE_MD).await;
        let job = ingest_source(&store, "demo", "rules.md", RULE_MD).await;

        assert_eq!(job.added, 0);
        assert_eq!(job.updated, 0);
    }

    #[tokio::test]
    async fn changed_pattern_is_counted_as_update() {
        let store = InMemoryRuleStore::new();
        ingest_source(&store, "demo", "rules.md", RULE_MD).await;

        let changed = RULE_MD.replace("git\\s+push\\s+--force", "git\\s+push\\s+-f");
        let job = ingest_source(&store, "demo", "rules.md", &changed).await;

        assert_eq!(job.added, 0);
        assert_eq!(job.updated, 1);
    }

    #[tokio::test]
    async fn disabled_rule_reappearing_unchanged_is_re_enabled_as_update() {
        let store = InMemoryRuleStore::new();
        ingest_source(&store, "demo", "rules.md", RULE_MD).await;
        ingest_source(&store, "demo", "rules.md", "").await;
        assert!(store.load_active_rules("demo").await.unwrap().is_empty());

        let job = ingest_source(&store, "demo", "rules.md", RULE_MD).await;
        assert_eq!(job.added, 0);
        assert_eq!(job.updated, 1);
        assert_eq!(store.load_active_rules("demo").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rule_missing_from_later_ingest_is_disabled() {
        let store = InMemoryRuleStore::new();
        ingest_source(&store, "demo", "rules.md", RULE_MD).await;

        let job = ingest_source(&store, "demo", "rules.md", "").await;
        assert_eq!(job.disabled, 1);
        assert!(store.load_active_rules("demo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_pattern_is_recorded_as_error_not_fatal() {
        let source = "\
## PREVENT-002: Bad

**Pattern:** `(unclosed`
**Message:** msg
**Severity:** error
**Category:** bash
";
        let store = InMemoryRuleStore::new();
        let job = ingest_source(&store, "demo", "rules.md", source).await;
        assert_eq!(job.added, 0);
        assert_eq!(job.errors.len(), 1);
        assert_eq!(job.errors[0].short_id.as_deref(), Some("PREVENT-002"));
    }

    #[tokio::test]
    async fn unrecognised_severity_defaults_to_warning() {
        let source = "\
## PREVENT-003: Sample

**Pattern:** `foo`
**Message:** msg
**Severity:** critical-ish
**Category:** bash
";
        let store = InMemoryRuleStore::new();
        ingest_source(&store, "demo", "rules.md", source).await;

        let rules = store.load_active_rules("demo").await.unwrap();
        assert_eq!(rules[0].severity, Severity::Warning);
    }
}
