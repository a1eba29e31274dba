use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::{
    config::AppConfig,
    database::{DynCacheService, channel::DynChannelRepository},
    server::error::AppResult,
};

use super::{
    browser_services::{DynBrowserService, HttpBrowserService},
    channel_cookie_services::{ChannelCookieService, DynChannelCookieService},
    cookie_pool_services::{CookiePoolService, DynCookiePoolService, PoolConfig},
    derivation_services::{DerivationService, DynDerivationService, PipelineConfig},
    manifest_services::{DynManifestService, ManifestService, ProxyConfig},
    stream_services::{DynStreamsService, StreamsService},
};

/// everything the handlers need, cloned into each request through an Extension
#[derive(Clone)]
pub struct EdgeServices {
    pub cache: DynCacheService,
    pub channels: DynChannelRepository,
    pub derivation: DynDerivationService,
    pub pool: DynCookiePoolService,
    pub channel_cookies: DynChannelCookieService,
    pub streams: DynStreamsService,
    pub manifests: DynManifestService,
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<AppConfig>,
}

impl EdgeServices {
    pub fn new(
        config: Arc<AppConfig>,
        cache: DynCacheService,
        channels: DynChannelRepository,
        metrics: Option<PrometheusHandle>,
    ) -> AppResult<Self> {
        info!("starting edge services...");

        let browser = Arc::new(HttpBrowserService::new(Duration::from_secs(
            config.browser_timeout,
        ))) as DynBrowserService;

        let derivation = Arc::new(DerivationService::new(
            cache.clone(),
            browser,
            PipelineConfig::from(config.as_ref()),
        )?) as DynDerivationService;

        info!("derivation pipeline ok, starting remaining services...");

        let pool = Arc::new(CookiePoolService::new(
            derivation.clone(),
            cache.clone(),
            PoolConfig::from(config.as_ref()),
        )) as DynCookiePoolService;

        let channel_cookies = Arc::new(ChannelCookieService::new(
            cache.clone(),
            derivation.clone(),
            config.channel_cookie_ttl,
        )) as DynChannelCookieService;

        let streams = Arc::new(StreamsService::new(
            channels.clone(),
            channel_cookies.clone(),
            pool.clone(),
        )) as DynStreamsService;

        let manifests = Arc::new(ManifestService::new(ProxyConfig::from(config.as_ref()))?);

        Ok(Self {
            cache,
            channels,
            derivation,
            pool,
            channel_cookies,
            streams,
            manifests,
            metrics,
            config,
        })
    }
}
