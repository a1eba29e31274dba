use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{StatusCode, header, redirect::Policy};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::database::DynCacheService;
use crate::database::credential::Credential;
use crate::server::error::{AppResult, Error};
use crate::server::services::browser_services::{DynBrowserService, RenderedPage};
use crate::server::services::token_services::PlaybackTokens;

pub type DynDerivationService = Arc<dyn DerivationServiceTrait + Send + Sync>;

pub const PLATFORM_TOKEN_KEY: &str = "platform_token";

// same pattern for the markup and the inline script scan
static PLATFORM_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""gwapiPlatformToken"\s*:\s*"([^"]+)""#).expect("static regex should compile")
});

static HDNTL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"hdntl=([^\s]+)").expect("static regex should compile"));

const PLATFORM_TOKEN_GLOBAL: &str = "__INITIAL_STATE__.gwapiPlatformToken";

/// everything the pipeline needs out of the app config
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub platform_base_url: String,
    pub landing_url: String,
    pub api_url: String,
    pub user_agent: String,
    pub credential_ttl: u64,
    pub platform_token_ttl: u64,
    pub upstream_timeout: Duration,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            platform_base_url: config.platform_base_url.clone(),
            landing_url: config.landing_url(),
            api_url: config.platform_api_url.clone(),
            user_agent: config.user_agent.clone(),
            credential_ttl: config.cookie_cache_ttl,
            platform_token_ttl: config.platform_token_ttl,
            upstream_timeout: Duration::from_secs(config.upstream_timeout),
        }
    }
}

/// ways of pulling the platform token out of a rendered landing page, tried in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Markup,
    GlobalState,
    InlineScripts,
}

impl ExtractionStrategy {
    pub const ORDER: [ExtractionStrategy; 3] = [
        ExtractionStrategy::Markup,
        ExtractionStrategy::GlobalState,
        ExtractionStrategy::InlineScripts,
    ];

    pub fn extract(&self, page: &RenderedPage) -> Option<String> {
        match self {
            Self::Markup => capture_platform_token(&page.markup),
            Self::GlobalState => page
                .evaluate(PLATFORM_TOKEN_GLOBAL)
                .filter(|token| !token.is_empty()),
            Self::InlineScripts => page
                .inline_scripts
                .iter()
                .find_map(|script| capture_platform_token(script)),
        }
    }
}

fn capture_platform_token(text: &str) -> Option<String> {
    PLATFORM_TOKEN_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// first strategy that finds something wins
pub fn extract_platform_token(page: &RenderedPage) -> AppResult<String> {
    let mut misses = Vec::new();

    for strategy in ExtractionStrategy::ORDER {
        match strategy.extract(page) {
            Some(token) => {
                debug!("Platform token found via {:?}", strategy);
                return Ok(token);
            }
            None => misses.push(format!("{:?}", strategy)),
        }
    }

    Err(Error::TokenExtractionFailed(format!(
        "no token in page (tried {})",
        misses.join(", ")
    )))
}

/// `hdntl=<value>` out of a manifest body, headers are never looked at
pub fn extract_manifest_credential(body: &str) -> Option<String> {
    HDNTL_PATTERN
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| format!("hdntl={}", m.as_str()))
}

// only the bit of the playback response we actually read
#[derive(Debug, Deserialize)]
struct SecurePlaybackResponse {
    #[serde(rename = "keyOsDetails")]
    key_os_details: Option<KeyOsDetails>,
}

#[derive(Debug, Deserialize)]
struct KeyOsDetails {
    video_token: Option<String>,
}

enum PlaybackAttempt {
    ManifestUrl(String),
    Unauthorized,
}

#[automock]
#[async_trait]
pub trait DerivationServiceTrait {
    /// runs the whole handshake for one channel and hands back a fresh credential
    async fn derive_credential(&self, channel_id: &str) -> AppResult<Credential>;

    /// drops the cached platform token so the next derivation renders the landing page again
    async fn invalidate_platform_token(&self) -> bool;
}

pub struct DerivationService {
    cache: DynCacheService,
    browser: DynBrowserService,
    http: reqwest::Client,
    manifest_http: reqwest::Client,
    config: PipelineConfig,
}

impl DerivationService {
    pub fn new(
        cache: DynCacheService,
        browser: DynBrowserService,
        config: PipelineConfig,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| {
                Error::InternalServerErrorWithContext(format!("failed to build api client: {}", e))
            })?;

        // the credential shows up in the body of the first response, following it would lose it
        let manifest_http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| {
                Error::InternalServerErrorWithContext(format!(
                    "failed to build manifest client: {}",
                    e
                ))
            })?;

        Ok(Self {
            cache,
            browser,
            http,
            manifest_http,
            config,
        })
    }

    async fn platform_token(&self) -> AppResult<String> {
        if let Some(token) = self.cache.get(PLATFORM_TOKEN_KEY).await {
            debug!("Using cached platform token");
            return Ok(token);
        }

        let page = self
            .browser
            .render(&self.config.landing_url, &self.config.user_agent)
            .await?;

        if page.status >= 400 {
            return Err(Error::TokenExtractionFailed(format!(
                "landing page returned {}",
                page.status
            )));
        }

        let token = extract_platform_token(&page)?;

        self.cache
            .set(
                PLATFORM_TOKEN_KEY,
                &token,
                Some(self.config.platform_token_ttl),
            )
            .await;

        info!("Platform token derived and cached");
        Ok(token)
    }

    fn playback_url(&self, channel_id: &str, guest_token: &str) -> String {
        format!(
            "{}/singlePlayback/getDetails/secure?channel_id={}&device_id={}&platform_name=desktop_web&translation=en&user_language=en,hi&country=IN&state=&app_version=4.24.0&user_type=guest&check_parental_control=false",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(channel_id),
            guest_token
        )
    }

    async fn request_playback(
        &self,
        channel_id: &str,
        tokens: &PlaybackTokens,
    ) -> AppResult<PlaybackAttempt> {
        let response = self
            .http
            .post(self.playback_url(channel_id, &tokens.guest_token))
            .headers(tokens.api_headers(&self.config.platform_base_url, &self.config.user_agent))
            .json(&tokens.api_payload())
            .send()
            .await
            .map_err(|e| Error::from_upstream("secure playback call failed", e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(PlaybackAttempt::Unauthorized);
        }

        if !status.is_success() {
            return Err(Error::UpstreamApi(format!(
                "secure playback returned {}",
                status
            )));
        }

        let body: SecurePlaybackResponse = response.json().await.map_err(|e| {
            Error::UpstreamApi(format!("secure playback response unreadable: {}", e))
        })?;

        body.key_os_details
            .and_then(|d| d.video_token)
            .filter(|url| !url.is_empty())
            .map(PlaybackAttempt::ManifestUrl)
            .ok_or_else(|| Error::UpstreamApi("response has no manifest url".to_string()))
    }

    /// the only retry in the pipeline: one 401 gets a fresh platform token, a second one is final
    async fn manifest_url(&self, channel_id: &str) -> AppResult<String> {
        let tokens = PlaybackTokens::new(self.platform_token().await?);

        match self.request_playback(channel_id, &tokens).await? {
            PlaybackAttempt::ManifestUrl(url) => return Ok(url),
            PlaybackAttempt::Unauthorized => {
                warn!(channel_id = %channel_id, "Platform token rejected, deriving a new one");
                self.invalidate_platform_token().await;
            }
        }

        let tokens = PlaybackTokens::new(self.platform_token().await?);

        match self.request_playback(channel_id, &tokens).await? {
            PlaybackAttempt::ManifestUrl(url) => Ok(url),
            PlaybackAttempt::Unauthorized => Err(Error::AuthRetryExhausted),
        }
    }

    async fn fetch_credential(&self, manifest_url: &str) -> AppResult<String> {
        let response = self
            .manifest_http
            .get(manifest_url)
            .header(header::USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| Error::from_upstream("manifest fetch failed", e))?;

        debug!("Manifest responded with {}", response.status());

        let body = response
            .text()
            .await
            .map_err(|e| Error::from_upstream("failed to read manifest", e))?;

        extract_manifest_credential(&body).ok_or(Error::CredentialNotFoundInManifest)
    }

    async fn run_pipeline(&self, channel_id: &str) -> AppResult<Credential> {
        let manifest_url = self.manifest_url(channel_id).await?;
        let value = self.fetch_credential(&manifest_url).await?;

        Ok(Credential::new(
            value,
            self.config.user_agent.clone(),
            self.config.credential_ttl,
        ))
    }
}

#[async_trait]
impl DerivationServiceTrait for DerivationService {
    async fn derive_credential(&self, channel_id: &str) -> AppResult<Credential> {
        info!(channel_id = %channel_id, "Deriving credential");

        match self.run_pipeline(channel_id).await {
            Ok(credential) => {
                metrics::counter!("credential_derivations_total", "outcome" => "success")
                    .increment(1);
                info!(channel_id = %channel_id, "Credential derived");
                Ok(credential)
            }
            Err(e) => {
                metrics::counter!("credential_derivations_total", "outcome" => "failure")
                    .increment(1);
                error!(channel_id = %channel_id, "Credential derivation failed: {}", e);
                Err(e)
            }
        }
    }

    async fn invalidate_platform_token(&self) -> bool {
        self.cache.delete(PLATFORM_TOKEN_KEY).await
    }
}
