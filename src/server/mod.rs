pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Extension, Router,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::database::{
    DynCacheService, DynFastTier, FileStore, RedisDatabase, TieredCache,
    channel::{DynChannelRepository, JsonChannelRepository},
};

use api::{
    admin_controller::AdminController, health_controller::health_endpoint,
    playlist_controller::PlaylistController, proxy_controller::ProxyController,
    stream_controller::StreamController,
};
use extractors::ClientContext;
use services::background_services::{spawn_refresh_loop, spawn_sweep_loop};
use services::edge_services::EdgeServices;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn get_uptime_seconds() -> u64 {
    STARTED_AT.elapsed().as_secs()
}

pub struct EdgeApplicationServer;

impl EdgeApplicationServer {
    /// full router, split out so it can be driven without binding a port
    pub fn router(services: EdgeServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        let mut router = Router::new()
            .route("/health", get(health_endpoint))
            .route("/metrics", get(Self::metrics_endpoint))
            .merge(StreamController::app())
            .merge(ProxyController::app())
            .merge(PlaylistController::app())
            .merge(AdminController::app());

        if services.config.enable_debug_routes {
            router = router.merge(AdminController::debug_app());
        }

        router
            .layer(Extension(services))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    fn cors_layer(cors_origin: &str) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if cors_origin.trim() == "*" {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();

        layer.allow_origin(origins)
    }

    async fn metrics_endpoint(ctx: ClientContext) -> Response {
        match &ctx.services.metrics {
            Some(handle) => (
                StatusCode::OK,
                [(
                    header::CONTENT_TYPE,
                    "text/plain; version=0.0.4; charset=utf-8",
                )],
                handle.render(),
            )
                .into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        }
    }

    fn install_metrics() -> Option<PrometheusHandle> {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Prometheus recorder not installed, /metrics disabled: {}", e);
                None
            }
        }
    }

    pub async fn serve(config: Arc<AppConfig>, redis: Option<RedisDatabase>) -> anyhow::Result<()> {
        Lazy::force(&STARTED_AT);

        let files = FileStore::open(&config.cache_dir)
            .await
            .with_context(|| format!("failed to open cache dir {}", config.cache_dir))?;
        let fast = redis.map(|db| Arc::new(db) as DynFastTier);
        let cache = Arc::new(TieredCache::new(fast, files)) as DynCacheService;

        let channels = Arc::new(
            JsonChannelRepository::load(&config.channels_file)
                .await
                .context("failed to load channel catalog")?,
        ) as DynChannelRepository;

        let services =
            EdgeServices::new(config.clone(), cache.clone(), channels, Self::install_metrics())
                .map_err(|e| anyhow::anyhow!("failed to build services: {}", e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let background = vec![
            spawn_refresh_loop(
                services.pool.clone(),
                Duration::from_secs(config.refresh_check_interval),
                shutdown_rx.clone(),
            ),
            spawn_sweep_loop(
                cache,
                Duration::from_secs(config.cache_sweep_interval),
                shutdown_rx,
            ),
        ];

        let app = Self::router(services);

        let addr: SocketAddr = format!("{}:{}", config.host, config.port)
            .parse()
            .context("invalid host/port")?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind to {}", addr))?;

        info!("routes ready, listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("http server drained, stopping background tasks...");
        let _ = shutdown_tx.send(true);

        for handle in background {
            if let Err(e) = handle.await {
                error!("background task ended badly: {}", e);
            }
        }

        info!("shutdown complete");
        Ok(())
    }
}

/// resolves on ctrl+c or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
