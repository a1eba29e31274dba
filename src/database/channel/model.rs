use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// these are based on the channel catalog json the service is deployed with. the catalog is
/// loaded once at startup and never changes afterwards

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub chno: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub genre: String,
    // base manifest url, the credential gets appended as the query string
    pub url: String,
}

impl Channel {
    /// `url?hdntl=...`, the credential is already in `name=value` form
    pub fn stream_url(&self, credential: &str) -> String {
        format!("{}?{}", self.url, credential)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelList {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub developers: String,
    pub data: Vec<Channel>,
}

/// filters for catalog search, empty fields don't filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelQuery {
    #[serde(default)]
    pub search: String,
    pub genre: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
}

pub type DynChannelRepository = Arc<dyn ChannelRepository + Send + Sync>;

pub trait ChannelRepository {
    fn get_channel(&self, channel_id: &str) -> Option<Channel>;
    fn get_all_channels(&self) -> Vec<Channel>;
    fn search_channels(&self, query: &ChannelQuery) -> Vec<Channel>;
    fn get_genres(&self) -> Vec<String>;
    fn get_languages(&self) -> Vec<String>;
    fn get_countries(&self) -> Vec<String>;
}
