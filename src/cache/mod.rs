//! Read-through cache used by catalog and per-user endpoints.
//!
//! Values are stored as JSON strings under the keys built in [`keys`]. The
//! cache is an optimisation only: callers treat every failure as a miss and
//! invalidation failures are logged rather than surfaced.

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod keys;
pub mod redis;

pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn ping(&self) -> Result<(), CacheError>;

    /// Short backend name reported by the health endpoint
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        matches!(self.expires_at, Some(expires_at) if Instant::now() >= expires_at)
    }
}

/// Process-local cache. Expired entries are dropped lazily on read.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let expired = match self.store.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.store.remove_if(key, |_, entry| entry.is_expired());
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.store
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

pub struct CacheFactory;

impl CacheFactory {
    /// Builds the configured backend, falling back to memory if Redis is unreachable.
    pub async fn create_cache(
        config: &crate::config::CacheConfig,
        redis_url: &str,
    ) -> Arc<dyn CacheBackend> {
        if config.uses_redis() {
            match RedisCache::connect(redis_url).await {
                Ok(cache) => {
                    info!("Using Redis cache backend");
                    return Arc::new(cache);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to connect to Redis, falling back to in-memory cache");
                }
            }
        }

        info!("Using in-memory cache backend");
        Arc::new(InMemoryCache::new())
    }
}

/// Reads and decodes a cached JSON value. Errors and undecodable entries count as misses.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn CacheBackend, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => {
                metrics::counter!("cache_hits_total", 1);
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                invalidate(cache, key).await;
                None
            }
        },
        Ok(None) => {
            metrics::counter!("cache_misses_total", 1);
            None
        }
        Err(e) => {
            metrics::counter!("cache_errors_total", 1);
            warn!(key, error = %e, "cache read failed");
            None
        }
    }
}

/// Encodes and stores a value. Failures are logged and swallowed.
pub async fn set_json<T: Serialize>(cache: &dyn CacheBackend, key: &str, value: &T, ttl: Duration) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key, error = %e, "failed to encode cache entry");
            return;
        }
    };
    if let Err(e) = cache.set(key, &raw, Some(ttl)).await {
        metrics::counter!("cache_errors_total", 1);
        warn!(key, error = %e, "cache write failed");
    }
}

/// Deletes a key after a mutation.
pub async fn invalidate(cache: &dyn CacheBackend, key: &str) {
    if let Err(e) = cache.delete(key).await {
        metrics::counter!("cache_errors_total", 1);
        warn!(key, error = %e, "cache invalidation failed");
    }
}
