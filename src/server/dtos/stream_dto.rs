use serde::{Deserialize, Serialize};

use crate::database::channel::Channel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    #[default]
    Redirect,
    Url,
    Hls,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub id: String,
    #[serde(default)]
    pub format: StreamFormat,
}

#[derive(Debug, Deserialize)]
pub struct StreamUrlQuery {
    pub id: String,
}

/// where the credential attached to a stream url came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    ChannelCache,
    Derived,
    SharedPool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamResponse {
    pub success: bool,
    pub channel: Channel,
    pub stream_url: String,
    pub base_url: String,
    pub cached: bool,
    pub source: CredentialSource,
    pub expires_in: u64,
}
