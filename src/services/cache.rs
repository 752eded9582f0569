use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur with cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cache miss: {0}")]
    CacheMiss(String),
}

/// Multi-tier cache manager
///
/// L1 is an in-process `moka` cache. L2 is Redis, shared across instances, and
/// optional: without it every read and write stops at L1.
pub struct CacheManager {
    redis: Option<Arc<tokio::sync::Mutex<ConnectionManager>>>,
    l1_cache: moka::future::Cache<String, Vec<u8>>,
    ttl_secs: u64,
}

impl CacheManager {
    /// Create a cache manager backed by Redis
    pub async fn new(redis_url: &str, l1_size: u64, ttl_secs: u64) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        let redis = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Some(Arc::new(tokio::sync::Mutex::new(redis))),
            ..Self::in_process(l1_size, ttl_secs)
        })
    }

    /// Create an L1-only cache manager
    pub fn in_process(l1_size: u64, ttl_secs: u64) -> Self {
        let l1_cache = moka::future::CacheBuilder::new(l1_size)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            redis: None,
            l1_cache,
            ttl_secs,
        }
    }

    /// Connect to Redis when a URL is configured, falling back to L1 only
    pub async fn connect(redis_url: Option<&str>, l1_size: u64, ttl_secs: u64) -> Self {
        let Some(url) = redis_url.filter(|u| !u.is_empty()) else {
            return Self::in_process(l1_size, ttl_secs);
        };

        match Self::new(url, l1_size, ttl_secs).await {
            Ok(cache) => cache,
            Err(e) => {
                tracing::error!("Failed to connect to Redis ({}), caching in-process only", e);
                Self::in_process(l1_size, ttl_secs)
            }
        }
    }

    pub fn has_redis(&self) -> bool {
        self.redis.is_some()
    }

    /// Get a value from cache (L1 first, then L2)
    pub async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: for<'de> Deserialize<'de>,
    {
        // Try L1 cache first
        if let Some(bytes) = self.l1_cache.get(key).await {
            tracing::trace!("L1 cache hit: {}", key);
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let Some(redis) = &self.redis else {
            tracing::trace!("Cache miss: {}", key);
            return Err(CacheError::CacheMiss(key.to_string()));
        };

        // Try L2 cache (Redis)
        let mut conn = redis.lock().await;
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        if let Some(json) = value {
            tracing::trace!("L2 cache hit: {}", key);

            // Populate L1 cache
            let bytes = json.as_bytes().to_vec();
            self.l1_cache.insert(key.to_string(), bytes).await;

            return Ok(serde_json::from_str(&json)?);
        }

        tracing::trace!("Cache miss: {}", key);
        Err(CacheError::CacheMiss(key.to_string()))
    }

    /// Set a value in cache (both L1 and L2)
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), CacheError>
    where
        T: Serialize,
    {
        let json = serde_json::to_string(value)?;

        // Set in L1 cache (uses configured TTL)
        let bytes = json.as_bytes().to_vec();
        self.l1_cache.insert(key.to_string(), bytes).await;

        if let Some(redis) = &self.redis {
            // Set in L2 cache with explicit TTL
            let mut conn = redis.lock().await;
            redis::cmd("SETEX")
                .arg(key)
                .arg(self.ttl_secs)
                .arg(json)
                .query_async::<()>(&mut *conn)
                .await?;
        }

        tracing::trace!("Cache set: {}", key);
        Ok(())
    }

    /// Invalidate all cache entries matching a pattern
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<(), CacheError> {
        // L1 has no pattern index, clear it whole
        self.l1_cache.invalidate_all();

        if let Some(redis) = &self.redis {
            let mut conn = redis.lock().await;
            let keys: Vec<String> = redis::cmd("KEYS")
                .arg(pattern)
                .query_async(&mut *conn)
                .await?;

            if !keys.is_empty() {
                redis::cmd("DEL")
                    .arg(keys)
                    .query_async::<()>(&mut *conn)
                    .await?;
            }
        }

        tracing::debug!("Invalidated cache pattern: {}", pattern);
        Ok(())
    }
}

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Pattern covering every character listing
    pub const LISTINGS: &'static str = "characters:*";

    pub fn leaderboard() -> String {
        "characters:leaderboard".to_string()
    }

    /// Top list, optionally narrowed to a race and bloodline
    pub fn top(race: Option<&str>, bloodline: Option<&str>) -> String {
        format!(
            "characters:top:{}:{}",
            race.unwrap_or("*all"),
            bloodline.unwrap_or("*all")
        )
    }

    pub fn worst() -> String {
        "characters:worst".to_string()
    }

    pub fn all() -> String {
        "characters:all".to_string()
    }

    pub fn count() -> String {
        "characters:count".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_cache_set_get_redis() {
        let cache = CacheManager::new("redis://127.0.0.1:6379", 1000, 60)
            .await
            .expect("Failed to create cache");

        cache.set("test_key", &"test_value").await.unwrap();
        let result: String = cache.get("test_key").await.unwrap();
        assert_eq!(result, "test_value");
    }

    #[tokio::test]
    async fn test_in_process_set_get_invalidate() {
        let cache = CacheManager::in_process(100, 60);
        assert!(!cache.has_redis());

        cache.set(&CacheKey::count(), &12u64).await.unwrap();
        let count: u64 = cache.get(&CacheKey::count()).await.unwrap();
        assert_eq!(count, 12);

        cache.invalidate_pattern(CacheKey::LISTINGS).await.unwrap();
        assert!(matches!(
            cache.get::<u64>(&CacheKey::count()).await,
            Err(CacheError::CacheMiss(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_without_url_is_in_process() {
        let cache = CacheManager::connect(None, 10, 5).await;
        assert!(!cache.has_redis());
    }

    #[test]
    fn test_cache_key_builder() {
        assert_eq!(CacheKey::leaderboard(), "characters:leaderboard");
        assert_eq!(CacheKey::top(None, None), "characters:top:*all:*all");
        assert_eq!(CacheKey::top(Some("Amarr"), Some("Khanid")), "characters:top:Amarr:Khanid");
        assert_eq!(CacheKey::worst(), "characters:worst");
        assert_eq!(CacheKey::count(), "characters:count");
    }
}
