//! Search result caching for providers

use super::traits::*;
use crate::config::CacheSettings;
use crate::references::Reference;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cached outcome of one search; `None` keeps the provider's "no opinion"
type CachedResults = Option<Vec<Reference>>;

/// Generate a cache key for a provider query
pub fn query_cache_key(provider: &str, query: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0u8]);
    hasher.update(query.trim().as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Provider decorator memoising successful search results per query.
///
/// Failures and cancellations are never cached; `ask` is passed through.
pub struct CachedProvider {
    inner: Arc<dyn Provider>,
    cache: Cache<String, CachedResults>,
}

impl CachedProvider {
    /// Create a new cache with specified TTL
    pub fn new(inner: Arc<dyn Provider>, ttl_seconds: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .max_capacity(max_capacity)
            .build();

        Self { inner, cache }
    }

    pub fn with_settings(inner: Arc<dyn Provider>, settings: &CacheSettings) -> Self {
        Self::new(inner, settings.ttl_seconds, settings.max_capacity)
    }
}

#[async_trait]
impl Provider for CachedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn before_search(&self, query: &str) -> Result<(), ProviderError> {
        self.inner.before_search(query).await
    }

    async fn search(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<Option<Vec<Reference>>, ProviderError> {
        let key = query_cache_key(self.inner.name(), query);
        if let Some(results) = self.cache.get(&key).await {
            debug!("Cache hit for '{}' on {}", query, self.inner.name());
            return Ok(results);
        }

        let results = self.inner.search(query, cancel).await?;
        self.cache.insert(key, results.clone()).await;
        Ok(results)
    }

    fn supports_ask(&self) -> bool {
        self.inner.supports_ask()
    }

    async fn ask(
        &self,
        session_id: u32,
        query: &str,
        deltas: DeltaSender,
        cancel: CancellationToken,
    ) -> Result<(), ProviderError> {
        self.inner.ask(session_id, query, deltas, cancel).await
    }
}
