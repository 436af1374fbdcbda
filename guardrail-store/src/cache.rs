//! Shared cache adapter (§2, §4.5): backs the rule cache's published
//! snapshots across server instances and the distributed rate-limit
//! counters. Every call goes through the cache circuit breaker at the call
//! site; this module only knows how to talk to one backend.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// A byte-string cache with TTL support, abstracting over Redis and the
/// in-memory test double.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically increment a counter, creating it with the given TTL if
    /// absent, and return the new value. Used by the rate limiter's
    /// distributed token-bucket counters (§4.5, §10.5).
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;
}

struct InMemoryEntry {
    value: Vec<u8>,
    expires_at: std::time::Instant,
}

/// In-memory cache used for tests and single-instance deployments without
/// Redis. Entries are lazily evicted on access.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, InMemoryEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > std::time::Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().insert(
            key.to_string(),
            InMemoryEntry {
                value,
                expires_at: std::time::Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut entries = self.entries.lock();
        let now = std::time::Instant::now();
        let current = entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| std::str::from_utf8(&entry.value).ok())
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(
            key.to_string(),
            InMemoryEntry {
                value: next.to_string().into_bytes(),
                expires_at: now + ttl,
            },
        );
        Ok(next)
    }
}

/// Redis-backed cache (§2: "Shared cache ... Redis"). Uses a
/// `ConnectionManager` so transient connection loss is retried transparently
/// by the client before the circuit breaker at the call site ever sees it.
pub struct RedisCache {
    manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|err| CacheError::Backend(err.into()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|err| CacheError::Backend(err.into()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(|err| CacheError::Backend(err.into()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|err| CacheError::Backend(err.into()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key).await.map_err(|err| CacheError::Backend(err.into()))
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(|err| CacheError::Backend(err.into()))?;
        if value == 1 {
            let _: () = conn
                .expire(key, ttl.as_secs().max(1) as i64)
                .await
                .map_err(|err| CacheError::Backend(err.into()))?;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = InMemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let cache = InMemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_millis(5))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_accumulates_within_ttl() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr("counter", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(cache.incr("counter", Duration::from_secs(60)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = InMemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
