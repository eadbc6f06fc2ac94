use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    metrics::{record_cache_hit, record_cache_miss, track_cache_operation},
    utils::time::{Clock, SystemClock},
};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Metrics that may be cached per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    BasicStats,
    MonthlyProgress,
    RecentStudyTime,
    UserProgress,
}

impl CacheType {
    pub const ALL: [CacheType; 4] = [
        CacheType::BasicStats,
        CacheType::MonthlyProgress,
        CacheType::RecentStudyTime,
        CacheType::UserProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::BasicStats => "basicStats",
            CacheType::MonthlyProgress => "monthlyProgress",
            CacheType::RecentStudyTime => "recentStudyTime",
            CacheType::UserProgress => "userProgress",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = AnalyticsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CacheType::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| AnalyticsError::InvalidCacheType(value.to_string()))
    }
}

/// Persistent key/value substrate behind the cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>>;
    async fn set(&self, key: &str, value: String) -> AnalyticsResult<()>;
    async fn remove(&self, key: &str) -> AnalyticsResult<()>;
    async fn ping(&self) -> AnalyticsResult<()>;
}

pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl RedisCacheStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        let mut conn = self.conn.clone();
        track_cache_operation("get", async {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<String>>(&mut conn)
                .await
                .map_err(|e| AnalyticsError::Cache(e.to_string()))
        })
        .await
    }

    async fn set(&self, key: &str, value: String) -> AnalyticsResult<()> {
        let mut conn = self.conn.clone();
        track_cache_operation("set", async {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| AnalyticsError::Cache(e.to_string()))
        })
        .await
    }

    async fn remove(&self, key: &str) -> AnalyticsResult<()> {
        let mut conn = self.conn.clone();
        track_cache_operation("del", async {
            redis::cmd("DEL")
                .arg(key)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| AnalyticsError::Cache(e.to_string()))
        })
        .await
    }

    async fn ping(&self) -> AnalyticsResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| AnalyticsError::Cache(e.to_string()))
    }
}

/// Process-local substrate used by tests and single-node development.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> AnalyticsResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> AnalyticsResult<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> AnalyticsResult<()> {
        self.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> AnalyticsResult<()> {
        Ok(())
    }
}

/// Serialized form of a cached payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// Write time, milliseconds since the epoch.
    pub timestamp: i64,
    pub data: T,
}

/// TTL cache keyed by `<metricType>-<userId>`. Expired entries are evicted
/// lazily when read.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { store, ttl, clock }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generate_key(user_id: &str, cache_type: CacheType) -> String {
        format!("{}-{}", cache_type.as_str(), user_id)
    }

    /// Key for a metric named at runtime. Unknown names are a programming error.
    pub fn generate_key_for(user_id: &str, cache_type: &str) -> AnalyticsResult<String> {
        let cache_type = cache_type.parse::<CacheType>()?;
        Ok(Self::generate_key(user_id, cache_type))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AnalyticsResult<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            record_cache_miss();
            return Ok(None);
        };

        let entry: CacheEntry<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Dropping unreadable cache entry");
                self.store.remove(key).await?;
                record_cache_miss();
                return Ok(None);
            }
        };

        let age_ms = self.clock.now().timestamp_millis() - entry.timestamp;
        if age_ms >= self.ttl.as_millis() as i64 {
            debug!(key, age_ms, "Cache entry expired");
            self.store.remove(key).await?;
            record_cache_miss();
            return Ok(None);
        }

        match serde_json::from_value(entry.data) {
            Ok(data) => {
                record_cache_hit();
                Ok(Some(data))
            }
            Err(e) => {
                warn!(key, error = %e, "Cached payload has unexpected shape");
                self.store.remove(key).await?;
                record_cache_miss();
                Ok(None)
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, data: &T) -> AnalyticsResult<()> {
        let entry = CacheEntry {
            timestamp: self.clock.now().timestamp_millis(),
            data,
        };
        let raw = serde_json::to_string(&entry)?;
        self.store.set(key, raw).await
    }

    pub async fn remove(&self, key: &str) -> AnalyticsResult<()> {
        self.store.remove(key).await
    }

    pub async fn invalidate(&self, user_id: &str, types: &[CacheType]) -> AnalyticsResult<()> {
        for cache_type in types {
            self.store
                .remove(&Self::generate_key(user_id, *cache_type))
                .await?;
        }
        debug!(user_id, ?types, "Invalidated cached analytics");
        Ok(())
    }
}
