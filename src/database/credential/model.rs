use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::file_store::MAX_TTL_SECONDS;

/// one `hdntl=...` credential and the bookkeeping the pool needs around it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
    pub user_agent: String,
    #[serde(default)]
    pub failure_count: u32,
}

impl Credential {
    pub fn new(value: String, user_agent: String, ttl_seconds: u64) -> Self {
        let created_at = Utc::now();
        Self {
            value,
            created_at,
            // capped so the addition can't overflow
            expires_at: created_at
                + chrono::Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64),
            is_valid: true,
            user_agent,
            failure_count: 0,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// usable iff still flagged valid and not past its expiry
    pub fn is_usable(&self) -> bool {
        self.is_valid && !self.is_expired()
    }

    pub fn remaining_seconds(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// what gets persisted under the pool key, the whole pool in one entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialPoolSnapshot {
    pub cookies: Vec<Credential>,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_ttl_is_capped_instead_of_wrapping() {
        let credential = Credential::new("hdntl=x".to_string(), "ua".to_string(), u64::MAX);

        assert!(credential.is_usable());
        assert!(credential.remaining_seconds() > 0);
    }
}
