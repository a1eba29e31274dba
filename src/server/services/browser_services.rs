//! browser capability used to pull the platform token out of the landing page
//!
//! the rest of the crate only sees [`BrowserServiceTrait`]: navigate somewhere, get back the
//! status, the markup, the inline scripts and a way to evaluate a `window.*` global. the shipped
//! [`HttpBrowserService`] does the navigation with a throwaway http session per call and answers
//! evaluations from the json the page assigns to its globals.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::server::error::{AppResult, Error};

pub type DynBrowserService = Arc<dyn BrowserServiceTrait + Send + Sync>;

static SCRIPT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("static selector should parse"));

// `window.__INITIAL_STATE__ = {` and friends
static GLOBAL_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"window\.([A-Za-z_$][A-Za-z0-9_$]*)\s*=\s*")
        .expect("static regex should compile")
});

/// what a navigation leaves behind once the page has rendered
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub status: u16,
    pub markup: String,
    pub inline_scripts: Vec<String>,
    globals: HashMap<String, Value>,
}

impl RenderedPage {
    pub fn new(status: u16, markup: String) -> Self {
        let inline_scripts = Self::collect_inline_scripts(&markup);
        let globals = Self::collect_globals(&inline_scripts);

        Self {
            status,
            markup,
            inline_scripts,
            globals,
        }
    }

    fn collect_inline_scripts(markup: &str) -> Vec<String> {
        let document = Html::parse_document(markup);

        document
            .select(&SCRIPT_SELECTOR)
            .filter(|el| el.value().attr("src").is_none())
            .map(|el| el.text().collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .collect()
    }

    fn collect_globals(scripts: &[String]) -> HashMap<String, Value> {
        let mut globals = HashMap::new();

        for script in scripts {
            for captures in GLOBAL_ASSIGNMENT.captures_iter(script) {
                let (Some(name), Some(whole)) = (captures.get(1), captures.get(0)) else {
                    continue;
                };

                // the deserializer stops after the first complete value so a trailing `;` or
                // more script is fine
                let rest = &script[whole.end()..];
                let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
                if let Some(Ok(value)) = stream.next() {
                    globals.insert(name.as_str().to_string(), value);
                }
            }
        }

        globals
    }

    /// evaluates a dotted `window` path like `__INITIAL_STATE__.gwapiPlatformToken`.
    /// only string results come back, anything else is treated as not found
    pub fn evaluate(&self, expression: &str) -> Option<String> {
        let expression = expression.trim().trim_start_matches("window.");
        let mut parts = expression.split('.');

        let mut current = self.globals.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }

        current.as_str().map(|s| s.to_string())
    }
}

#[automock]
#[async_trait]
pub trait BrowserServiceTrait {
    /// navigate to `url` in a fresh session and hand back the rendered page
    async fn render(&self, url: &str, user_agent: &str) -> AppResult<RenderedPage>;
}

pub struct HttpBrowserService {
    timeout: Duration,
    // one navigation at a time, same as a single shared browser would behave
    lock: Mutex<()>,
}

impl HttpBrowserService {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl BrowserServiceTrait for HttpBrowserService {
    async fn render(&self, url: &str, user_agent: &str) -> AppResult<RenderedPage> {
        let _guard = self.lock.lock().await;

        info!("Rendering {}", url);

        // fresh session per navigation, dropped when this returns
        let session = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(self.timeout)
            .build()
            .map_err(|e| {
                Error::InternalServerErrorWithContext(format!("failed to build session: {}", e))
            })?;

        let response = session
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-IN,en;q=0.9")
            .send()
            .await
            .map_err(|e| Error::from_upstream("landing page navigation failed", e))?;

        let status = response.status().as_u16();
        let markup = response
            .text()
            .await
            .map_err(|e| Error::from_upstream("failed to read landing page", e))?;

        debug!("Rendered {} ({} bytes, status {})", url, markup.len(), status);

        Ok(RenderedPage::new(status, markup))
    }
}
