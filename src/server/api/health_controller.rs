use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;

use crate::server::dtos::cookie_dto::PoolState;
use crate::server::dtos::health_dto::{
    CacheHealth, ChannelHealth, CookiePoolHealth, HealthResponse, HealthStatus,
    ServiceHealthDetails,
};
use crate::server::extractors::ClientContext;
use crate::server::services::edge_services::EdgeServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// cache, catalog and pool in one report. only a missing catalog makes the whole thing
/// unhealthy, everything else degrades
pub async fn health_endpoint(ctx: ClientContext) -> (StatusCode, Json<HealthResponse>) {
    let services = &ctx.services;

    let cache = check_cache_health(services).await;
    let channels = check_channel_health(services);
    let cookie_pool = check_pool_health(services);

    let statuses = [cache.status, channels.status, cookie_pool.status];
    let overall_status = if statuses.contains(&HealthStatus::Unhealthy) {
        HealthStatus::Unhealthy
    } else if statuses.contains(&HealthStatus::Degraded) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            cache,
            channels,
            cookie_pool,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}

async fn check_cache_health(services: &EdgeServices) -> CacheHealth {
    if !services.cache.has_fast_tier() {
        return CacheHealth {
            status: HealthStatus::Healthy,
            backend: "file",
            response_time_ms: None,
        };
    }

    // redis down still leaves the file tier working
    match services.cache.fast_tier_ping().await {
        Some(ms) => CacheHealth {
            status: HealthStatus::Healthy,
            backend: "redis",
            response_time_ms: Some(ms),
        },
        None => CacheHealth {
            status: HealthStatus::Degraded,
            backend: "redis",
            response_time_ms: None,
        },
    }
}

fn check_channel_health(services: &EdgeServices) -> ChannelHealth {
    let total = services.channels.get_all_channels().len();

    ChannelHealth {
        status: if total > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        },
        total,
    }
}

fn check_pool_health(services: &EdgeServices) -> CookiePoolHealth {
    let status = services.pool.status();

    CookiePoolHealth {
        status: match status.state {
            PoolState::Ready => HealthStatus::Healthy,
            PoolState::Empty | PoolState::Warming | PoolState::Degraded => HealthStatus::Degraded,
        },
        state: status.state,
        valid_cookies: status.valid_cookies,
        total_cookies: status.total_cookies,
    }
}
