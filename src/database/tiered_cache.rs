use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{debug, info, warn};

use crate::database::FileStore;
use crate::database::file_store::MAX_TTL_SECONDS;

pub type DynCacheService = Arc<dyn CacheServiceTrait + Send + Sync>;

pub type DynFastTier = Arc<dyn FastTierTrait + Send + Sync>;

/// key -> string store with ttl, redis first and the file store behind it
#[async_trait]
pub trait CacheServiceTrait {
    async fn get(&self, key: &str) -> Option<String>;

    /// ttl of None (or 0) means the entry never expires
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> bool;

    async fn delete(&self, key: &str) -> bool;

    async fn exists(&self, key: &str) -> bool;

    /// sweeps expired entries out of the durable tier
    async fn clear_expired(&self) -> usize;

    /// true while the fast tier is attached
    fn has_fast_tier(&self) -> bool;

    async fn fast_tier_ping(&self) -> Option<f64>;
}

/// the networked tier in front of the files. errors are reported, never retried here
#[automock]
#[async_trait]
pub trait FastTierTrait {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// None stores without an expiry
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// round trip in milliseconds
    async fn ping(&self) -> anyhow::Result<f64>;
}

pub struct TieredCache {
    fast: Option<DynFastTier>,
    files: FileStore,
}

impl TieredCache {
    pub fn new(fast: Option<DynFastTier>, files: FileStore) -> Self {
        if fast.is_none() {
            info!("Redis disabled, using file cache only");
        }
        Self { fast, files }
    }

    pub fn file_only(files: FileStore) -> Self {
        Self::new(None, files)
    }
}

#[async_trait]
impl CacheServiceTrait for TieredCache {
    async fn get(&self, key: &str) -> Option<String> {
        if let Some(fast) = &self.fast {
            match fast.get(key).await {
                Ok(Some(value)) => {
                    debug!("Cache hit (Redis): {}", key);
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => warn!("Redis get error: {}, falling back to file", e),
            }
        }

        self.files.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> bool {
        // both tiers agree on what "no expiry" means
        let ttl_seconds = ttl_seconds.filter(|ttl| *ttl > 0 && *ttl <= MAX_TTL_SECONDS);
        let mut fast_ok = false;

        if let Some(fast) = &self.fast {
            match fast.set(key, value, ttl_seconds).await {
                Ok(()) => {
                    debug!("Cache set (Redis): {}", key);
                    fast_ok = true;
                }
                Err(e) => warn!("Redis set error: {}, falling back to file", e),
            }
        }

        // the file copy is always written, it's what survives a redis restart
        let file_ok = self.files.set(key, value, ttl_seconds).await;

        fast_ok || file_ok
    }

    async fn delete(&self, key: &str) -> bool {
        let mut fast_ok = false;

        if let Some(fast) = &self.fast {
            match fast.delete(key).await {
                Ok(()) => fast_ok = true,
                Err(e) => warn!("Redis delete error: {}", e),
            }
        }

        let file_ok = self.files.delete(key).await;

        fast_ok || file_ok
    }

    async fn exists(&self, key: &str) -> bool {
        if let Some(fast) = &self.fast {
            match fast.exists(key).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!("Redis exists error: {}, falling back to file", e),
            }
        }

        self.files.exists(key).await
    }

    async fn clear_expired(&self) -> usize {
        let count = self.files.clear_expired().await;
        if count > 0 {
            info!("Cleared {} expired cache entries", count);
        }
        count
    }

    fn has_fast_tier(&self) -> bool {
        self.fast.is_some()
    }

    async fn fast_tier_ping(&self) -> Option<f64> {
        let fast = self.fast.as_ref()?;
        match fast.ping().await {
            Ok(ms) => Some(ms),
            Err(e) => {
                warn!("Redis health check failed: {}", e);
                None
            }
        }
    }
}
