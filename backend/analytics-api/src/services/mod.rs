use std::{sync::Arc, time::Duration};

use mongodb::Client as MongoClient;
use redis::aio::ConnectionManager;

use crate::{
    config::Config,
    middlewares::auth::JwtClaims,
    models::user::CurrentUser,
};

use self::{
    analytics::{AnalyticsService, SessionAuth},
    cache::{CacheManager, CacheStore, RedisCacheStore},
    progress_store::{MongoProgressStore, ProgressStore},
};

pub mod analytics;
pub mod cache;
pub mod progress_store;
pub mod transformers;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProgressStore>,
    pub cache_store: Arc<dyn CacheStore>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let store = MongoProgressStore::new(mongo_client, &config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        let mut conn = redis.clone();
        tokio::time::timeout(
            Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self::with_backends(
            config,
            Arc::new(store),
            Arc::new(RedisCacheStore::new(redis)),
        ))
    }

    /// State over arbitrary backends, e.g. the in-memory ones in tests.
    pub fn with_backends(
        config: Config,
        store: Arc<dyn ProgressStore>,
        cache_store: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            config,
            store,
            cache_store,
        }
    }

    pub fn cache(&self) -> CacheManager {
        CacheManager::new(
            self.cache_store.clone(),
            Duration::from_secs(self.config.analytics.cache_ttl_secs),
        )
    }

    /// Analytics service acting on behalf of the caller identified by `claims`.
    pub fn analytics_for(&self, claims: &JwtClaims) -> AnalyticsService {
        AnalyticsService::new(
            self.store.clone(),
            self.cache(),
            Arc::new(SessionAuth::signed_in(CurrentUser::from(claims))),
            self.config.analytics.clone(),
        )
    }
}
