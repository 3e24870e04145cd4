// Permalink Cache - short-lived snapshot of every live page with translations

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::CacheClient;
use crate::models::Page;

/// The single key the page collection is cached under.
pub const ROUTES_CACHE_KEY: &str = "routes.pages";

#[derive(Clone)]
pub struct PermalinkCache {
    client: Arc<dyn CacheClient>,
    ttl: Duration,
}

impl std::fmt::Debug for PermalinkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermalinkCache")
            .field("key", &ROUTES_CACHE_KEY)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl PermalinkCache {
    pub fn new(client: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    pub fn key(&self) -> &'static str {
        ROUTES_CACHE_KEY
    }

    /// Cached pages if present and fresh, otherwise `loader()` stored under
    /// the key. Concurrent misses may both load; the last store wins.
    #[instrument(skip(self, loader))]
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> AppResult<Vec<Page>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<Vec<Page>>> + Send,
    {
        if let Some(bytes) = self.client.get(ROUTES_CACHE_KEY).await? {
            match serde_json::from_slice::<Vec<Page>>(&bytes) {
                Ok(pages) => {
                    debug!("Permalink cache hit ({} pages)", pages.len());
                    return Ok(pages);
                }
                Err(e) => warn!("Discarding unreadable permalink cache entry: {}", e),
            }
        }

        let pages = loader().await?;
        let bytes = serde_json::to_vec(&pages).map_err(|e| {
            AppError::SerializationError(format!("Failed to serialize page collection: {}", e))
        })?;
        self.client.put(ROUTES_CACHE_KEY, bytes, self.ttl).await?;
        debug!("Permalink cache populated with {} pages", pages.len());
        Ok(pages)
    }

    /// Evict the snapshot. Call only after the mutation has committed.
    pub async fn invalidate(&self) -> AppResult<()> {
        let evicted = self.client.forget(ROUTES_CACHE_KEY).await?;
        debug!("Permalink cache invalidated (entry present: {})", evicted);
        Ok(())
    }
}
