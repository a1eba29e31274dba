use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::credential::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolState {
    Empty,
    Warming,
    Ready,
    Degraded,
}

/// per credential line in the status report, the value itself is never echoed back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieDetail {
    pub index: usize,
    pub is_valid: bool,
    pub is_expired: bool,
    pub remaining_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub failure_count: u32,
}

impl CookieDetail {
    pub fn from_credential(index: usize, credential: &Credential) -> Self {
        Self {
            index,
            is_valid: credential.is_valid,
            is_expired: credential.is_expired(),
            remaining_seconds: credential.remaining_seconds(),
            created_at: credential.created_at,
            expires_at: credential.expires_at,
            failure_count: credential.failure_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookiePoolStatus {
    pub state: PoolState,
    pub refreshing: bool,
    pub total_cookies: usize,
    pub valid_cookies: usize,
    pub expired_cookies: usize,
    pub cookies: Vec<CookieDetail>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub next_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CookieRefreshResponse {
    pub success: bool,
    pub generated: usize,
    pub status: CookiePoolStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct CookieInvalidateRequest {
    /// the credential to mark as failed, defaults to the one currently handed out
    pub cookie: Option<String>,
    /// drop this channel's cached credential instead, the pool is left alone
    pub channel: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CookieInvalidateResponse {
    pub success: bool,
    pub invalidated: bool,
    pub status: CookiePoolStatus,
}
