use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Context;
use tracing::info;

use super::model::{Channel, ChannelList, ChannelQuery, ChannelRepository};

/// in memory catalog loaded from the channels json file
pub struct JsonChannelRepository {
    channels: Vec<Channel>,
    by_id: HashMap<String, usize>,
}

impl JsonChannelRepository {
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        let by_id = channels
            .iter()
            .enumerate()
            .map(|(idx, channel)| (channel.id.clone(), idx))
            .collect();

        Self { channels, by_id }
    }

    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Loading channels from {}", path.display());

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Channel data file not found: {}", path.display()))?;

        let list: ChannelList =
            serde_json::from_str(&raw).context("Channel data file is not a valid channel list")?;

        info!("Loaded {} channels", list.data.len());

        Ok(Self::from_channels(list.data))
    }

    fn unique_sorted<F>(&self, field: F) -> Vec<String>
    where
        F: Fn(&Channel) -> &str,
    {
        self.channels
            .iter()
            .map(|c| field(c).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl ChannelRepository for JsonChannelRepository {
    fn get_channel(&self, channel_id: &str) -> Option<Channel> {
        self.by_id
            .get(channel_id)
            .map(|idx| self.channels[*idx].clone())
    }

    fn get_all_channels(&self) -> Vec<Channel> {
        self.channels.clone()
    }

    fn search_channels(&self, query: &ChannelQuery) -> Vec<Channel> {
        let needle = query.search.trim().to_lowercase();

        self.channels
            .iter()
            .filter(|c| {
                needle.is_empty()
                    || c.name.to_lowercase().contains(&needle)
                    || c.genre.to_lowercase().contains(&needle)
                    || c.language.to_lowercase().contains(&needle)
                    || c.id.to_lowercase().contains(&needle)
            })
            .filter(|c| {
                query
                    .genre
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .is_none_or(|genre| c.genre.eq_ignore_ascii_case(genre))
            })
            .filter(|c| {
                query
                    .language
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .is_none_or(|language| c.language.eq_ignore_ascii_case(language))
            })
            .filter(|c| {
                query
                    .country
                    .as_deref()
                    .filter(|v| !v.is_empty())
                    .is_none_or(|country| c.country.eq_ignore_ascii_case(country))
            })
            .cloned()
            .collect()
    }

    fn get_genres(&self) -> Vec<String> {
        self.unique_sorted(|c| &c.genre)
    }

    fn get_languages(&self) -> Vec<String> {
        self.unique_sorted(|c| &c.language)
    }

    fn get_countries(&self) -> Vec<String> {
        self.unique_sorted(|c| &c.country)
    }
}
