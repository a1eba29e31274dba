use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{debug, error, info};

use crate::database::DynCacheService;
use crate::server::error::AppResult;
use crate::server::services::derivation_services::DynDerivationService;

/// 10 hours, shorter than the credential itself so a cached one is never handed out stale
pub const CHANNEL_COOKIE_TTL_SECONDS: u64 = 36000;

pub type DynChannelCookieService = Arc<dyn ChannelCookieServiceTrait + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCookie {
    pub value: String,
    /// true when it came out of the cache rather than a fresh derivation
    pub cached: bool,
}

#[automock]
#[async_trait]
pub trait ChannelCookieServiceTrait {
    /// credential for this channel, derived and cached on a miss
    async fn get_channel_cookie(&self, channel_id: &str) -> AppResult<ChannelCookie>;

    async fn invalidate(&self, channel_id: &str) -> bool;

    fn ttl_seconds(&self) -> u64;
}

pub struct ChannelCookieService {
    cache: DynCacheService,
    derivation: DynDerivationService,
    ttl_seconds: u64,
}

impl ChannelCookieService {
    pub fn new(cache: DynCacheService, derivation: DynDerivationService, ttl_seconds: u64) -> Self {
        Self {
            cache,
            derivation,
            ttl_seconds,
        }
    }

    pub fn cookie_key(channel_id: &str) -> String {
        format!("channel_cookie:{}", channel_id)
    }
}

#[async_trait]
impl ChannelCookieServiceTrait for ChannelCookieService {
    async fn get_channel_cookie(&self, channel_id: &str) -> AppResult<ChannelCookie> {
        let key = Self::cookie_key(channel_id);

        if let Some(value) = self.cache.get(&key).await {
            debug!(channel_id = %channel_id, "Using cached cookie ({} bytes)", value.len());
            return Ok(ChannelCookie {
                value,
                cached: true,
            });
        }

        info!(channel_id = %channel_id, "Generating new channel cookie");

        // the pipeline runs against this channel's own id, the cdn acl is per channel
        let credential = self.derivation.derive_credential(channel_id).await?;

        if !self
            .cache
            .set(&key, &credential.value, Some(self.ttl_seconds))
            .await
        {
            error!(channel_id = %channel_id, "Failed to cache channel cookie");
        } else {
            debug!(
                "Stored cookie for channel {} (TTL: {}s)",
                channel_id, self.ttl_seconds
            );
        }

        Ok(ChannelCookie {
            value: credential.value,
            cached: false,
        })
    }

    async fn invalidate(&self, channel_id: &str) -> bool {
        self.cache.delete(&Self::cookie_key(channel_id)).await
    }

    fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }
}
