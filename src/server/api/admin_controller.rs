use axum::{Json, Router, routing::{get, post}};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use crate::server::{
    dtos::cookie_dto::{
        CookieInvalidateRequest, CookieInvalidateResponse, CookiePoolStatus,
        CookieRefreshResponse,
    },
    extractors::ClientContext,
    get_app_version, get_uptime_seconds,
    services::derivation_services::PLATFORM_TOKEN_KEY,
};

pub struct AdminController;

impl AdminController {
    pub fn app() -> Router {
        Router::new()
            .route("/cookie/status", get(Self::cookie_status))
            .route("/cookie/refresh", post(Self::refresh_cookies))
            .route("/cookie/invalidate", post(Self::invalidate_cookie))
    }

    /// only mounted when debug routes are enabled
    pub fn debug_app() -> Router {
        Router::new().route("/debug/info", get(Self::debug_info))
    }

    async fn cookie_status(ctx: ClientContext) -> Json<CookiePoolStatus> {
        Json(ctx.services.pool.status())
    }

    async fn refresh_cookies(ctx: ClientContext) -> Json<CookieRefreshResponse> {
        info!("Manual cookie refresh requested");
        let generated = ctx.services.pool.refresh().await;

        Json(CookieRefreshResponse {
            success: generated > 0,
            generated,
            status: ctx.services.pool.status(),
        })
    }

    async fn invalidate_cookie(
        ctx: ClientContext,
        body: Option<Json<CookieInvalidateRequest>>,
    ) -> Json<CookieInvalidateResponse> {
        let request = body.map(|Json(b)| b).unwrap_or_default();

        let invalidated = match request.channel {
            Some(channel_id) => {
                info!(channel_id = %channel_id, "Dropping cached channel cookie");
                ctx.services.channel_cookies.invalidate(&channel_id).await
            }
            None => ctx.services.pool.report_failure(request.cookie).await,
        };

        Json(CookieInvalidateResponse {
            success: invalidated,
            invalidated,
            status: ctx.services.pool.status(),
        })
    }

    async fn debug_info(ctx: ClientContext) -> Json<Value> {
        let services = &ctx.services;
        let config = &services.config;

        Json(json!({
            "version": get_app_version(),
            "uptime_seconds": get_uptime_seconds(),
            "timestamp": Utc::now(),
            "base_url": ctx.base_url,
            "user_agent": ctx.user_agent,
            "cache": {
                "backend": if services.cache.has_fast_tier() { "redis" } else { "file" },
                "cache_dir": config.cache_dir,
                "platform_token_cached": services.cache.exists(PLATFORM_TOKEN_KEY).await,
            },
            "channels": services.channels.get_all_channels().len(),
            "cookie_pool": services.pool.status(),
            "settings": {
                "cookie_pool_size": config.cookie_pool_size,
                "cookie_cache_ttl": config.cookie_cache_ttl,
                "cookie_refresh_interval": config.cookie_refresh_interval,
                "channel_cookie_ttl": config.channel_cookie_ttl,
                "platform_token_ttl": config.platform_token_ttl,
                "probe_channel_id": config.probe_channel_id,
                "platform_api_url": config.platform_api_url,
            },
        }))
    }
}
