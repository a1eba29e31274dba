use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::dtos::cookie_dto::PoolState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub environment: String,
    pub services: ServiceHealthDetails,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealthDetails {
    pub cache: CacheHealth,
    pub channels: ChannelHealth,
    pub cookie_pool: CookiePoolHealth,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub status: HealthStatus,
    /// "redis" or "file"
    pub backend: &'static str,
    pub response_time_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ChannelHealth {
    pub status: HealthStatus,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CookiePoolHealth {
    pub status: HealthStatus,
    pub state: PoolState,
    pub valid_cookies: usize,
    pub total_cookies: usize,
}
