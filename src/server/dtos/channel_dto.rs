use serde::Serialize;

use crate::database::channel::Channel;

#[derive(Debug, Serialize)]
pub struct ChannelsResponse {
    pub success: bool,
    pub total: usize,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Serialize)]
pub struct ChannelStatsResponse {
    pub total_channels: usize,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub countries: Vec<String>,
}
