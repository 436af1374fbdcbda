//! Token bucket rate limiting (§4.6): per authenticated key, with limits per
//! endpoint class. Backed by the shared cache for distributed counters;
//! falls back to a local in-process bucket when the cache breaker is open
//! (§4.5: "rate limiting degrades to local token bucket").

use std::time::Duration;

use dashmap::DashMap;
use guardrail_store::Backends;

/// The endpoint classes §4.6 calls out by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    SessionInit,
    Validation,
    Stream,
}

impl EndpointClass {
    fn as_str(self) -> &'static str {
        match self {
            Self::SessionInit => "session_init",
            Self::Validation => "validation",
            Self::Stream => "stream",
        }
    }
}

/// A single local token bucket: `capacity` tokens, refilled fully once per
/// `window`. Used both as the sole counter in single-instance deployments'
/// fallback path and as the cache-degraded fallback.
struct LocalBucket {
    remaining: u32,
    window_started_at: std::time::Instant,
}

pub struct RateLimiter {
    backends: Backends,
    window: Duration,
    local_buckets: DashMap<(String, EndpointClass), LocalBucket>,
}

pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(backends: Backends) -> Self {
        Self {
            backends,
            window: Duration::from_secs(60),
            local_buckets: DashMap::new(),
        }
    }

    /// Check and consume one token for `api_key` under `class`, with a
    /// per-minute budget of `limit_per_min`. Tries the distributed counter
    /// first (through the cache breaker); on short-circuit, falls back to a
    /// local bucket (§4.5).
    pub async fn check(
        &self,
        api_key: &str,
        class: EndpointClass,
        limit_per_min: u32,
    ) -> RateLimitDecision {
        let cache_key = format!("ratelimit:{}:{}", class.as_str(), api_key);
        let cache = self.backends.cache.clone();
        let window = self.window;

        let result = self
            .backends
            .breakers
            .cache
            .call(|| {
                let cache = cache.clone();
                let cache_key = cache_key.clone();
                async move { cache.incr(&cache_key, window).await }
            })
            .await;

        match result {
            Ok(count) => {
                if count as u32 <= limit_per_min {
                    RateLimitDecision {
                        allowed: true,
                        retry_after_secs: 0,
                    }
                } else {
                    tracing::warn!(class = class.as_str(), api_key_hash = %short_hash(api_key), "rate limit exceeded");
                    RateLimitDecision {
                        allowed: false,
                        retry_after_secs: self.window.as_secs(),
                    }
                }
            }
            Err(_breaker_open) => self.check_local(api_key, class, limit_per_min),
        }
    }

    fn check_local(
        &self,
        api_key: &str,
        class: EndpointClass,
        limit_per_min: u32,
    ) -> RateLimitDecision {
        let key = (api_key.to_string(), class);
        let now = std::time::Instant::now();
        let mut bucket = self.local_buckets.entry(key).or_insert_with(|| LocalBucket {
            remaining: limit_per_min,
            window_started_at: now,
        });

        if now.duration_since(bucket.window_started_at) >= self.window {
            bucket.remaining = limit_per_min;
            bucket.window_started_at = now;
        }

        if bucket.remaining == 0 {
            RateLimitDecision {
                allowed: false,
                retry_after_secs: self.window.as_secs(),
            }
        } else {
            bucket.remaining -= 1;
            RateLimitDecision {
                allowed: true,
                retry_after_secs: 0,
            }
        }
    }
}

fn short_hash(value: &str) -> String {
    blake3::hash(value.as_bytes()).to_hex()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrail_store::{InMemoryCache, InMemoryRuleStore};
    use std::sync::Arc;

    fn limiter() -> RateLimiter {
        let backends = Backends::new(
            Arc::new(InMemoryRuleStore::new()),
            Arc::new(InMemoryCache::new()),
        );
        RateLimiter::new(backends)
    }

    #[tokio::test]
    async fn allows_requests_within_budget() {
        let limiter = limiter();
        for _ in 0..5 {
            let decision = limiter.check("key-a", EndpointClass::Validation, 5).await;
            assert!(decision.allowed);
        }
    }

    #[tokio::test]
    async fn rejects_requests_over_budget() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.check("key-b", EndpointClass::Validation, 3).await;
        }
        let decision = limiter.check("key-b", EndpointClass::Validation, 3).await;
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs > 0);
    }

    #[tokio::test]
    async fn different_keys_have_independent_budgets() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.check("key-c", EndpointClass::Validation, 3).await;
        }
        let decision = limiter.check("key-d", EndpointClass::Validation, 3).await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn local_fallback_enforces_budget_when_cache_breaker_is_open() {
        let limiter = limiter();
        for _ in 0..3 {
            limiter.check_local("key-e", EndpointClass::Validation, 3);
        }
        let decision = limiter.check_local("key-e", EndpointClass::Validation, 3);
        assert!(!decision.allowed);
    }
}
