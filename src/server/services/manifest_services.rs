//! manifest rewriting proxy
//!
//! every uri line of a fetched playlist gets resolved against the playlist's own url and turned
//! into `/proxy?url=<b64>&type=<class>`, so the client walks master -> variant -> segment through
//! us without ever seeing the cdn. segments are passed through untouched.
use std::sync::Arc;
use std::time::Duration;

use reqwest::header;
use serde::Deserialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::AppConfig;
use crate::server::error::{AppResult, Error};
use crate::server::utils::compression_utils::ContentEncoding;
use crate::server::utils::url_utils::{decode_proxied_url, proxy_url};

pub type DynManifestService = Arc<ManifestService>;

// transport stream and fragmented mp4 media, everything else is treated as another playlist
const SEGMENT_EXTENSIONS: [&str; 9] = [
    "ts", "m4s", "m4a", "m4v", "mp4", "aac", "cmfv", "cmfa", "vtt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    #[default]
    Master,
    Variant,
    Segment,
}

impl ContentClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Variant => "variant",
            Self::Segment => "segment",
        }
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, Self::Master | Self::Variant)
    }

    /// what a rewritten reference points at, judged by the extension of its path
    pub fn classify(target: &Url) -> Self {
        let extension = target
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .and_then(|last| last.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());

        match extension {
            Some(ext) if SEGMENT_EXTENSIONS.contains(&ext.as_str()) => Self::Segment,
            _ => Self::Variant,
        }
    }
}

/// rewrites a playlist body. blank and `#` lines stay as they are, every other line is a uri
pub fn rewrite_manifest(text: &str, base_url: &str, proxy_prefix: &str) -> AppResult<String> {
    let base = Url::parse(base_url)
        .map_err(|e| Error::BadRequest(format!("bad manifest url {}: {}", base_url, e)))?;

    let mut output = Vec::new();
    for raw in text.split('\n') {
        let line = raw.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            output.push(line.to_string());
            continue;
        }

        let target = base.join(trimmed).map_err(|e| {
            Error::InternalServerErrorWithContext(format!(
                "unresolvable reference {}: {}",
                trimmed, e
            ))
        })?;

        let class = ContentClass::classify(&target);
        output.push(proxy_url(proxy_prefix, target.as_str(), class.as_str()));
    }

    Ok(output.join("\n"))
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub user_agent: String,
    pub platform_base_url: String,
    pub public_url: Option<String>,
    pub upstream_timeout: Duration,
}

impl From<&AppConfig> for ProxyConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            platform_base_url: config.platform_base_url.clone(),
            public_url: config.public_url.clone().filter(|u| !u.is_empty()),
            upstream_timeout: Duration::from_secs(config.upstream_timeout),
        }
    }
}

pub enum ProxiedContent {
    Playlist {
        body: Vec<u8>,
        /// false when rewriting failed and the upstream bytes are passed through as they were
        rewritten: bool,
    },
    Segment {
        content_type: String,
        upstream: reqwest::Response,
    },
}

pub struct ManifestService {
    http: reqwest::Client,
    config: ProxyConfig,
}

impl ManifestService {
    pub fn new(config: ProxyConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| {
                Error::InternalServerErrorWithContext(format!(
                    "failed to build proxy client: {}",
                    e
                ))
            })?;

        Ok(Self { http, config })
    }

    /// absolute when a public url is configured, relative to this server otherwise
    pub fn proxy_prefix(&self) -> &str {
        self.config
            .public_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .unwrap_or("")
    }

    async fn fetch_upstream(&self, target: &str) -> AppResult<reqwest::Response> {
        let origin = self.config.platform_base_url.trim_end_matches('/');

        let response = self
            .http
            .get(target)
            .header(header::USER_AGENT, &self.config.user_agent)
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::ORIGIN, origin)
            .header(header::REFERER, format!("{}/", origin))
            .send()
            .await
            .map_err(|e| Error::from_upstream("proxy fetch failed", e))?;

        let status = response.status();
        if !status.is_success() {
            error!("Response from target not successful: {}", status);
            return Err(Error::UpstreamApi(format!("cdn returned {}", status)));
        }

        Ok(response)
    }

    pub async fn fetch_and_rewrite(
        &self,
        encoded_url: &str,
        class: ContentClass,
    ) -> AppResult<ProxiedContent> {
        let target = decode_proxied_url(encoded_url)?;
        debug!("Proxying ({}): {}", class.as_str(), target);

        metrics::counter!("proxy_requests_total", "class" => class.as_str()).increment(1);

        let upstream = self.fetch_upstream(&target).await?;

        if !class.is_playlist() {
            let content_type = upstream
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .unwrap_or("video/MP2T")
                .to_string();

            return Ok(ProxiedContent::Segment {
                content_type,
                upstream,
            });
        }

        let encoding = ContentEncoding::from_content_encoding(
            upstream
                .headers()
                .get(header::CONTENT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        // redirects are followed here, relative lines resolve against where we ended up
        let base_url = upstream.url().to_string();

        let bytes = upstream
            .bytes()
            .await
            .map_err(|e| Error::from_upstream("failed to read playlist", e))?;

        let raw = match encoding.decompress(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to decompress playlist with {:?}: {}", encoding, e);
                bytes.to_vec()
            }
        };

        let rewritten = std::str::from_utf8(&raw)
            .map_err(|e| {
                Error::InternalServerErrorWithContext(format!("playlist is not utf-8: {}", e))
            })
            .and_then(|text| rewrite_manifest(text, &base_url, self.proxy_prefix()));

        match rewritten {
            Ok(text) => Ok(ProxiedContent::Playlist {
                body: text.into_bytes(),
                rewritten: true,
            }),
            Err(e) => {
                warn!("Playlist rewrite failed, passing it through: {}", e);
                Ok(ProxiedContent::Playlist {
                    body: raw,
                    rewritten: false,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_path_extension() {
        let seg = Url::parse("https://cdn.example/live/seg-001.TS?hdntl=x").unwrap();
        let fmp4 = Url::parse("https://cdn.example/live/chunk.m4s").unwrap();
        let playlist = Url::parse("https://cdn.example/live/720p.m3u8?x=seg.ts").unwrap();

        assert_eq!(ContentClass::classify(&seg), ContentClass::Segment);
        assert_eq!(ContentClass::classify(&fmp4), ContentClass::Segment);
        assert_eq!(ContentClass::classify(&playlist), ContentClass::Variant);
    }

    #[test]
    fn strips_carriage_returns_from_tags() {
        let text = "#EXTM3U\r\n#EXT-X-VERSION:3\r\n";
        let out = rewrite_manifest(text, "https://cdn.example/a.m3u8", "").unwrap();

        assert_eq!(out, "#EXTM3U\n#EXT-X-VERSION:3\n");
    }
}
