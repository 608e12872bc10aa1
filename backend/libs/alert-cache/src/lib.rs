//! Caching layer for the alert engine
//!
//! Provides a consistent caching strategy for derived engine state with:
//! - Unified key schema with versioning
//! - Genuine delete-based invalidation (no TTL-overwrite tricks)
//! - TTL jitter to prevent thundering herd
//! - An in-memory implementation for tests and cache-less deployments

mod error;
mod keys;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKey, CACHE_VERSION};

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

/// Default TTL values (seconds)
pub mod ttl {
    pub const ENGAGEMENT_PROFILE: u64 = 86_400; // 24 hours
    pub const DELIVERY_STATS: u64 = 3_600; // 1 hour
}

/// Core cache operations trait
#[async_trait::async_trait]
pub trait CacheOperations: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()>;

    /// Delete a key from cache
    async fn del(&self, key: &str) -> CacheResult<()>;

    /// Check if key exists
    async fn exists(&self, key: &str) -> CacheResult<bool>;
}

/// Redis-backed cache client
#[derive(Clone)]
pub struct RedisCache {
    redis: SharedRedis,
}

impl RedisCache {
    pub fn new(redis: SharedRedis) -> Self {
        Self { redis }
    }

    /// Add jitter to TTL to prevent thundering herd
    fn add_jitter(ttl_secs: u64) -> u64 {
        let jitter_percent = (rand::random::<u32>() % 10) as f64 / 100.0;
        let jitter = (ttl_secs as f64 * jitter_percent).round() as u64;
        ttl_secs + jitter
    }
}

#[async_trait::async_trait]
impl CacheOperations for RedisCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>> {
        let mut conn = self.redis.lock().await;

        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str::<T>(&data) {
                Ok(value) => {
                    debug!(key = %key, "Cache hit");
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Cache deserialization failed");
                    // Delete corrupted cache entry
                    let _ = conn.del::<_, ()>(key).await;
                    Ok(None)
                }
            },
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Redis get error");
                Err(CacheError::Redis(e))
            }
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value).map_err(CacheError::Serialization)?;
        let ttl_with_jitter = Self::add_jitter(ttl_secs);

        let mut conn = self.redis.lock().await;
        conn.set_ex::<_, _, ()>(key, data, ttl_with_jitter)
            .await
            .map_err(CacheError::Redis)?;

        debug!(key = %key, ttl = ttl_with_jitter, "Cache set");
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.redis.lock().await;
        conn.del::<_, ()>(key).await.map_err(CacheError::Redis)?;

        debug!(key = %key, "Cache delete");
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.redis.lock().await;
        let exists: bool = conn.exists(key).await.map_err(CacheError::Redis)?;
        Ok(exists)
    }
}

/// In-memory cache for tests and deployments without Redis
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, (String, Option<Instant>)>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(expires_at: &Option<Instant>) -> bool {
        matches!(expires_at, Some(at) if *at <= Instant::now())
    }
}

#[async_trait::async_trait]
impl CacheOperations for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> CacheResult<Option<T>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((data, expires_at)) if !Self::is_expired(expires_at) => {
                let value = serde_json::from_str::<T>(data)?;
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> CacheResult<()> {
        let data = serde_json::to_string(value)?;
        let expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), (data, expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((_, expires_at)) => Ok(!Self::is_expired(expires_at)),
            None => Ok(false),
        }
    }
}
