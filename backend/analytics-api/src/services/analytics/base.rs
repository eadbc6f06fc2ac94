use std::{future::Future, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    metrics::ANALYTICS_FALLBACKS_TOTAL,
    models::user::CurrentUser,
    services::cache::{CacheManager, CacheType},
};

/// Exposes the signed-in user, if any.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// Auth provider for a session whose identity is already resolved, e.g. from
/// validated JWT claims.
#[derive(Debug, Clone, Default)]
pub struct SessionAuth {
    user: Option<CurrentUser>,
}

impl SessionAuth {
    pub fn signed_in(user: CurrentUser) -> Self {
        Self { user: Some(user) }
    }

    pub fn anonymous() -> Self {
        Self { user: None }
    }
}

impl AuthProvider for SessionAuth {
    fn current_user(&self) -> Option<CurrentUser> {
        self.user.clone()
    }
}

/// Cross-cutting plumbing shared by analytics operations: auth check,
/// cache-aside reads and the degrade-to-defaults policy.
///
/// Cache failures never fail an operation; they are logged and the store is
/// used directly. Concurrent cold reads may each hit the store.
#[derive(Clone)]
pub struct AnalyticsBase {
    cache: CacheManager,
    auth: Arc<dyn AuthProvider>,
}

impl AnalyticsBase {
    pub fn new(cache: CacheManager, auth: Arc<dyn AuthProvider>) -> Self {
        Self { cache, auth }
    }

    pub fn ensure_authenticated(&self) -> AnalyticsResult<CurrentUser> {
        self.auth.current_user().ok_or_else(|| {
            warn!("Analytics request without an authenticated user");
            AnalyticsError::NotAuthenticated
        })
    }

    pub async fn cached<T: DeserializeOwned>(
        &self,
        user_id: &str,
        cache_type: CacheType,
    ) -> Option<T> {
        let key = CacheManager::generate_key(user_id, cache_type);
        match self.cache.get(&key).await {
            Ok(Some(data)) => {
                debug!(key, "Serving analytics from cache");
                Some(data)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, falling back to store");
                None
            }
        }
    }

    pub async fn store<T: Serialize>(&self, user_id: &str, cache_type: CacheType, data: &T) {
        let key = CacheManager::generate_key(user_id, cache_type);
        if let Err(e) = self.cache.set(&key, data).await {
            warn!(key, error = %e, "Failed to cache analytics result");
        }
    }

    pub async fn get_with_cache<T, F, Fut>(
        &self,
        user_id: &str,
        cache_type: CacheType,
        fetch: F,
    ) -> AnalyticsResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalyticsResult<T>>,
    {
        if let Some(hit) = self.cached(user_id, cache_type).await {
            return Ok(hit);
        }

        let data = fetch().await?;
        self.store(user_id, cache_type, &data).await;
        Ok(data)
    }

    /// Recomputes and overwrites the cached value regardless of its age. A
    /// failed recompute drops the stale entry instead of leaving it in place.
    pub async fn refresh_cache<T, F, Fut>(
        &self,
        user_id: &str,
        cache_type: CacheType,
        fetch: F,
    ) -> AnalyticsResult<T>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalyticsResult<T>>,
    {
        match fetch().await {
            Ok(data) => {
                self.store(user_id, cache_type, &data).await;
                Ok(data)
            }
            Err(e) => {
                self.invalidate(user_id, &[cache_type]).await;
                Err(e)
            }
        }
    }

    pub async fn invalidate(&self, user_id: &str, types: &[CacheType]) {
        if let Err(e) = self.cache.invalidate(user_id, types).await {
            warn!(user_id, error = %e, "Failed to invalidate cached analytics");
        }
    }

    /// Logs the failure and hands back the caller's safe default.
    pub fn error_response<T>(&self, operation: &str, err: &AnalyticsError, default: T) -> T {
        ANALYTICS_FALLBACKS_TOTAL
            .with_label_values(&[operation])
            .inc();
        error!(operation, error = %err, "Analytics operation failed, returning defaults");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::{MemoryCacheStore, DEFAULT_CACHE_TTL};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base(auth: SessionAuth) -> (AnalyticsBase, Arc<MemoryCacheStore>) {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = CacheManager::new(store.clone(), DEFAULT_CACHE_TTL);
        (AnalyticsBase::new(cache, Arc::new(auth)), store)
    }

    fn user() -> CurrentUser {
        CurrentUser {
            uid: "user1".to_string(),
            email: Some("pilot@example.com".to_string()),
            email_verified: true,
        }
    }

    #[test]
    fn test_ensure_authenticated() {
        let (signed_in, _) = base(SessionAuth::signed_in(user()));
        assert_eq!(signed_in.ensure_authenticated().unwrap().uid, "user1");

        let (anonymous, _) = base(SessionAuth::anonymous());
        assert!(matches!(
            anonymous.ensure_authenticated(),
            Err(AnalyticsError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_get_with_cache_fetches_once() {
        let (base, store) = base(SessionAuth::signed_in(user()));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: u32 = base
                .get_with_cache("user1", CacheType::BasicStats, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.contains("basicStats-user1"));
    }

    #[tokio::test]
    async fn test_get_with_cache_does_not_cache_failures() {
        let (base, store) = base(SessionAuth::signed_in(user()));

        let result: AnalyticsResult<u32> = base
            .get_with_cache("user1", CacheType::BasicStats, || async {
                Err(AnalyticsError::read("questions", "offline"))
            })
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_cache_overwrites() {
        let (base, _) = base(SessionAuth::signed_in(user()));
        base.store("user1", CacheType::UserProgress, &1u32).await;

        let fresh: u32 = base
            .refresh_cache("user1", CacheType::UserProgress, || async { Ok(2) })
            .await
            .unwrap();

        assert_eq!(fresh, 2);
        assert_eq!(
            base.cached::<u32>("user1", CacheType::UserProgress).await,
            Some(2)
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_stale_entry() {
        let (base, store) = base(SessionAuth::signed_in(user()));
        base.store("user1", CacheType::UserProgress, &1u32).await;

        let result: AnalyticsResult<u32> = base
            .refresh_cache("user1", CacheType::UserProgress, || async {
                Err(AnalyticsError::read("user progress", "offline"))
            })
            .await;

        assert!(result.is_err());
        assert!(!store.contains("userProgress-user1"));
    }

    #[test]
    fn test_error_response_returns_default() {
        let (base, _) = base(SessionAuth::anonymous());
        let value = base.error_response(
            "getBasicStats",
            &AnalyticsError::NotAuthenticated,
            vec![0u32; 3],
        );
        assert_eq!(value, vec![0, 0, 0]);
    }
}
