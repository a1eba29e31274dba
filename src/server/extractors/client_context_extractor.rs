use axum::Extension;
use axum::extract::FromRequestParts;
use axum::http::header::{HOST, USER_AGENT};
use axum::http::request::Parts;
use tracing::debug;

use crate::server::error::Error;
use crate::server::services::edge_services::EdgeServices;

const MEDIA_PLAYER_AGENTS: [&str; 3] = ["vlc", "mplayer", "kodi"];

/// who is asking and how to build absolute urls back to this server
pub struct ClientContext {
    pub user_agent: Option<String>,
    pub base_url: String,
    pub services: EdgeServices,
}

impl ClientContext {
    /// players that want the bare url as text instead of a redirect
    pub fn is_media_player(&self) -> bool {
        self.user_agent.as_deref().is_some_and(|ua| {
            let ua = ua.to_ascii_lowercase();
            MEDIA_PLAYER_AGENTS.iter().any(|p| ua.contains(p))
        })
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
}

/// public_url wins, then the forwarded host a reverse proxy sets, then Host
pub fn resolve_base_url(parts: &Parts, public_url: Option<&str>) -> String {
    if let Some(public) = public_url.filter(|u| !u.is_empty()) {
        return public.trim_end_matches('/').to_string();
    }

    let scheme = header_str(parts, "x-forwarded-proto").unwrap_or("http");
    let host = header_str(parts, "x-forwarded-host")
        .or_else(|| header_str(parts, HOST.as_str()))
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}

impl<S> FromRequestParts<S> for ClientContext
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(services): Extension<EdgeServices> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|err| Error::InternalServerErrorWithContext(err.to_string()))?;

        let user_agent = parts
            .headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        let base_url = resolve_base_url(parts, services.config.public_url.as_deref());
        debug!("Client base url: {}, user agent: {:?}", base_url, user_agent);

        Ok(ClientContext {
            user_agent,
            base_url,
            services,
        })
    }
}
