//! Rule cache (§4.1): builds a compiled snapshot of a project's active rules
//! and failure records, republishing it on a TTL and falling back to the
//! last-good snapshot (flagged stale) when the store is unreachable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use guardrail_store::{Backends, BreakerCallError, StoreError};
use guardrail_types::{FailureRecord, Rule};
use parking_lot::Mutex;

use crate::pattern::CompiledRule;

/// Default time a snapshot is considered fresh before a rebuild is attempted
/// (§4.1: "TTL default 30s").
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30);

/// A compiled, immutable view of one project's rules and failures, ready for
/// the engine to match requests against without touching the store.
#[derive(Clone)]
pub struct Snapshot {
    pub project_slug: String,
    pub rules: Arc<Vec<CompiledRule>>,
    pub failures: Arc<Vec<FailureRecord>>,
    pub built_at: Instant,
    /// Set when this snapshot is being served past its TTL because the store
    /// or cache is unavailable (§4.1, §4.5: "last known good ... `stale`
    /// flag").
    pub stale: bool,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.built_at.elapsed() < ttl
    }
}

struct SlotState {
    snapshot: Option<Snapshot>,
    building: bool,
}

/// One project's cache slot. Rebuilds are serialized by `building` so
/// concurrent callers don't issue redundant store round-trips; only the
/// winner swaps the published snapshot (§4.1: "atomic build-then-publish").
struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                snapshot: None,
                building: false,
            }),
        }
    }
}

/// Rebuild-and-publish rule cache, keyed by project slug.
pub struct RuleCache {
    backends: Backends,
    ttl: Duration,
    slots: dashmap::DashMap<String, Arc<Slot>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuleCacheError {
    #[error("project `{0}` has no rules loaded yet and the store is unavailable")]
    NoSnapshotAvailable(String),
}

impl RuleCache {
    pub fn new(backends: Backends) -> Self {
        Self::with_ttl(backends, DEFAULT_SNAPSHOT_TTL)
    }

    pub fn with_ttl(backends: Backends, ttl: Duration) -> Self {
        Self {
            backends,
            ttl,
            slots: dashmap::DashMap::new(),
        }
    }

    /// Return a fresh (or, failing that, last-good stale) snapshot for
    /// `project_slug`. Never blocks concurrent readers behind a rebuild:
    /// only the first caller to notice staleness rebuilds; everyone else
    /// gets the snapshot currently published.
    pub async fn get(&self, project_slug: &str) -> Result<Snapshot, RuleCacheError> {
        let slot = self
            .slots
            .entry(project_slug.to_string())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone();

        let (current, should_rebuild) = {
            let mut state = slot.state.lock();
            match &state.snapshot {
                Some(snapshot) if snapshot.is_fresh(self.ttl) => (Some(snapshot.clone()), false),
                Some(snapshot) => {
                    let should_rebuild = !state.building;
                    if should_rebuild {
                        state.building = true;
                    }
                    (Some(snapshot.clone()), should_rebuild)
                }
                None => {
                    let should_rebuild = !state.building;
                    if should_rebuild {
                        state.building = true;
                    }
                    (None, should_rebuild)
                }
            }
        };

        if !should_rebuild {
            return current.ok_or_else(|| RuleCacheError::NoSnapshotAvailable(project_slug.to_string()));
        }

        let rebuild_result = self.rebuild(project_slug).await;
        let mut state = slot.state.lock();
        state.building = false;

        match rebuild_result {
            Ok(fresh) => {
                state.snapshot = Some(fresh.clone());
                Ok(fresh)
            }
            Err(_) => match &state.snapshot {
                Some(snapshot) => {
                    let mut stale = snapshot.clone();
                    stale.stale = true;
                    Ok(stale)
                }
                None => Err(RuleCacheError::NoSnapshotAvailable(project_slug.to_string())),
            },
        }
    }

    async fn rebuild(&self, project_slug: &str) -> Result<Snapshot, anyhow::Error> {
        let breakers = &self.backends.breakers;
        let store = self.backends.rule_store.clone();

        let rules: Vec<Rule> = {
            let store = store.clone();
            let slug = project_slug.to_string();
            breakers
                .store
                .call(|| async move { store.load_active_rules(&slug).await })
                .await
                .map_err(breaker_err_to_anyhow::<StoreError>)?
        };

        let failures: Vec<FailureRecord> = {
            let store = store.clone();
            let slug = project_slug.to_string();
            breakers
                .store
                .call(|| async move { store.load_active_failures(&slug).await })
                .await
                .map_err(breaker_err_to_anyhow::<StoreError>)?
        };

        let compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter_map(|rule| match CompiledRule::compile(rule) {
                Ok(compiled) => Some(compiled),
                Err((rule, err)) => {
                    tracing::warn!(rule = %rule.short_id, error = %err, "dropping rule with invalid pattern from snapshot");
                    None
                }
            })
            .collect();

        tracing::info!(
            project_slug,
            rules_loaded = compiled.len(),
            failures_loaded = failures.len(),
            "rule cache snapshot rebuilt"
        );

        Ok(Snapshot {
            project_slug: project_slug.to_string(),
            rules: Arc::new(compiled),
            failures: Arc::new(failures),
            built_at: Instant::now(),
            stale: false,
        })
    }

    /// Drop a project's published snapshot, forcing the next `get` to
    /// rebuild. Used after rule ingestion so changes are visible without
    /// waiting out the TTL.
    pub fn invalidate(&self, project_slug: &str) {
        if let Some(slot) = self.slots.get(project_slug) {
            slot.state.lock().snapshot = None;
        }
    }
}

fn breaker_err_to_anyhow<E: std::error::Error + Send + Sync + 'static>(
    err: BreakerCallError<E>,
) -> anyhow::Error {
    match err {
        BreakerCallError::Open(open) => anyhow::Error::new(open),
        BreakerCallError::Backend(backend) => anyhow::Error::new(backend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_store::InMemoryRuleStore;
    use guardrail_types::{RuleCategory, Severity};
    use std::sync::Arc;

    fn sample_rule(short_id: &str) -> Rule {
        Rule {
            id: uuid::Uuid::new_v4(),
            short_id: short_id.to_string(),
            name: "sample".to_string(),
            pattern: "forbidden".to_string(),
            pattern_hash: "hash".to_string(),
            message: "blocked".to_string(),
            severity: Severity::Error,
            category: RuleCategory::Bash,
            enabled: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn in_memory_backends() -> (Backends, Arc<InMemoryRuleStore>) {
        let store = Arc::new(InMemoryRuleStore::new());
        let backends = Backends::new(store.clone(), Arc::new(guardrail_store::InMemoryCache::new()));
        (backends, store)
    }

    #[tokio::test]
    async fn builds_snapshot_from_store() {
        let (backends, store) = in_memory_backends();
        store.seed_rule("demo", sample_rule("PREVENT-1"));

        let cache = RuleCache::new(backends);
        let snapshot = cache.get("demo").await.unwrap();
        assert_eq!(snapshot.rules.len(), 1);
        assert!(!snapshot.stale);
    }

    #[tokio::test]
    async fn invalid_pattern_is_dropped_not_fatal() {
        let (backends, store) = in_memory_backends();
        let mut bad = sample_rule("PREVENT-1");
        bad.pattern = "(unclosed".to_string();
        store.seed_rule("demo", bad);
        store.seed_rule("demo", sample_rule("PREVENT-2"));

        let cache = RuleCache::new(backends);
        let snapshot = cache.get("demo").await.unwrap();
        assert_eq!(snapshot.rules.len(), 1);
        assert_eq!(snapshot.rules[0].rule.short_id, "PREVENT-2");
    }

    #[tokio::test]
    async fn empty_project_yields_empty_snapshot_not_error() {
        let (backends, _store) = in_memory_backends();
        let cache = RuleCache::new(backends);
        let snapshot = cache.get("demo").await.unwrap();
        assert!(snapshot.rules.is_empty());
    }

    #[tokio::test]
    async fn invalidate_forces_rebuild_on_next_get() {
        let (backends, store) = in_memory_backends();
        let cache = RuleCache::new(backends);

        let first = cache.get("demo").await.unwrap();
        assert!(first.rules.is_empty());

        store.seed_rule("demo", sample_rule("PREVENT-1"));
        cache.invalidate("demo");

        let second = cache.get("demo").await.unwrap();
        assert_eq!(second.rules.len(), 1);
    }
}
