use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{info, warn};

use crate::database::channel::{Channel, DynChannelRepository};
use crate::server::dtos::stream_dto::CredentialSource;
use crate::server::error::{AppResult, Error};
use crate::server::services::channel_cookie_services::DynChannelCookieService;
use crate::server::services::cookie_pool_services::DynCookiePoolService;

pub type DynStreamsService = Arc<dyn StreamsServiceTrait + Send + Sync>;

/// a channel with a credential attached, ready to hand to a player
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub channel: Channel,
    pub credential: String,
    pub stream_url: String,
    pub source: CredentialSource,
    pub expires_in: u64,
}

impl ResolvedStream {
    pub fn cached(&self) -> bool {
        self.source == CredentialSource::ChannelCache
    }
}

#[automock]
#[async_trait]
pub trait StreamsServiceTrait {
    async fn resolve(&self, channel_id: &str) -> AppResult<ResolvedStream>;
}

pub struct StreamsService {
    channels: DynChannelRepository,
    channel_cookies: DynChannelCookieService,
    pool: DynCookiePoolService,
}

impl StreamsService {
    pub fn new(
        channels: DynChannelRepository,
        channel_cookies: DynChannelCookieService,
        pool: DynCookiePoolService,
    ) -> Self {
        Self {
            channels,
            channel_cookies,
            pool,
        }
    }
}

#[async_trait]
impl StreamsServiceTrait for StreamsService {
    async fn resolve(&self, channel_id: &str) -> AppResult<ResolvedStream> {
        let channel = self
            .channels
            .get_channel(channel_id)
            .ok_or_else(|| Error::ResourceNotFound(channel_id.to_string()))?;

        // channel credential first, the warm pool only as a fallback. a url without a
        // credential never leaves here
        let (credential, source, expires_in) =
            match self.channel_cookies.get_channel_cookie(channel_id).await {
                Ok(cookie) => {
                    let source = if cookie.cached {
                        CredentialSource::ChannelCache
                    } else {
                        CredentialSource::Derived
                    };
                    (cookie.value, source, self.channel_cookies.ttl_seconds())
                }
                Err(e) => {
                    warn!(channel_id = %channel_id, "Channel cookie unavailable ({}), trying the shared pool", e);

                    let fallback = self.pool.best_available().await.ok_or_else(|| {
                        Error::StreamUnavailable(format!("no credential for {}: {}", channel_id, e))
                    })?;

                    let remaining = fallback.remaining_seconds().max(0) as u64;
                    (fallback.value, CredentialSource::SharedPool, remaining)
                }
            };

        let stream_url = channel.stream_url(&credential);
        info!(channel_id = %channel_id, source = ?source, "Generated stream url for {}", channel.name);

        Ok(ResolvedStream {
            channel,
            credential,
            stream_url,
            source,
            expires_in,
        })
    }
}
