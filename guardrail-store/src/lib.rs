//! Storage-layer adapters for the guardrail service: the rule/failure store,
//! the shared cache, and the circuit breakers that wrap both (§2, §4.5).

pub mod breaker;
pub mod cache;
pub mod rule_store;

pub use breaker::{BreakerCallError, BreakerConfig, BreakerOpenError, BreakerState, CircuitBreaker};
pub use cache::{CacheError, InMemoryCache, RedisCache, SharedCache};
pub use rule_store::{InMemoryRuleStore, PostgresRuleStore, RuleStore, StoreError};

use std::sync::Arc;

/// The pair of breakers the engine needs: one for the rule/failure store,
/// one for the shared cache, each with its own window and cooldown (§4.5).
pub struct Breakers {
    pub store: CircuitBreaker,
    pub cache: CircuitBreaker,
}

impl Breakers {
    pub fn new() -> Self {
        Self {
            store: CircuitBreaker::new("rule-store", BreakerConfig::store_defaults()),
            cache: CircuitBreaker::new("shared-cache", BreakerConfig::cache_defaults()),
        }
    }
}

impl Default for Breakers {
    fn default() -> Self {
        Self::new()
    }
}

/// Bundles the store, cache, and their breakers into the single handle the
/// rest of the service wires through (engine, session manager, server).
#[derive(Clone)]
pub struct Backends {
    pub rule_store: Arc<dyn RuleStore>,
    pub cache: Arc<dyn SharedCache>,
    pub breakers: Arc<Breakers>,
}

impl Backends {
    pub fn new(rule_store: Arc<dyn RuleStore>, cache: Arc<dyn SharedCache>) -> Self {
        Self {
            rule_store,
            cache,
            breakers: Arc::new(Breakers::new()),
        }
    }

    /// Backends wired entirely in-memory, for tests and local development.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryCache::new()),
        )
    }
}
