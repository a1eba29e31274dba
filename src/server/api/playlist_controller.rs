use std::fmt::Write as _;

use axum::{
    Router,
    extract::Query,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};

use crate::database::channel::{Channel, ChannelQuery};
use crate::server::extractors::ClientContext;

pub struct PlaylistController;

/// iptv playlist where every entry points back at `/stream`, players pick the credential up there
pub fn render_playlist(
    channels: &[Channel],
    base_url: &str,
    user_agent: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let base_url = base_url.trim_end_matches('/');
    let encoded_ua = urlencoding::encode(user_agent);
    let mut out = String::new();

    // writing into a String never fails
    let _ = writeln!(out, "#EXTM3U");
    let _ = writeln!(
        out,
        "#EXTINF:-1 tvg-id=\"\" tvg-name=\"Live TV Playlist\" tvg-logo=\"\" group-title=\"INFO\",Live TV Gateway - {} Channels",
        channels.len()
    );
    let _ = writeln!(out, "# Server: {}", base_url);
    let _ = writeln!(out, "# Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "# Total Channels: {}", channels.len());
    let _ = writeln!(out);

    for channel in channels.iter().filter(|c| !c.id.is_empty()) {
        let language = if channel.language.is_empty() {
            "EN".to_string()
        } else {
            channel.language.to_uppercase()
        };
        let group = if channel.genre.is_empty() {
            "General"
        } else {
            &channel.genre
        };
        let chno = if channel.chno.is_empty() { "000" } else { &channel.chno };
        let country = if channel.country.is_empty() {
            "IN"
        } else {
            &channel.country
        };

        let _ = writeln!(
            out,
            "#EXTINF:-1 tvg-id=\"{}\" tvg-name=\"{}\" tvg-logo=\"{}\" tvg-chno=\"{}\" tvg-country=\"{}\" tvg-language=\"{}\" group-title=\"{}\",{} [{}]",
            channel.id, channel.name, channel.logo, chno, country, language, group, channel.name, language
        );
        let _ = writeln!(out, "#KODIPROP:inputstream=inputstream.adaptive");
        let _ = writeln!(out, "#KODIPROP:inputstream.adaptive.manifest_type=HLS");
        let _ = writeln!(
            out,
            "#KODIPROP:inputstream.adaptive.manifest_headers=User-Agent={}",
            encoded_ua
        );
        let _ = writeln!(
            out,
            "#KODIPROP:inputstream.adaptive.stream_headers=User-Agent={}",
            encoded_ua
        );
        let _ = writeln!(out, "#EXTVLCOPT:http-user-agent={}", user_agent);
        let _ = writeln!(
            out,
            "{}/stream?id={}",
            base_url,
            urlencoding::encode(&channel.id)
        );
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "# End of playlist");
    out
}

impl PlaylistController {
    pub fn app() -> Router {
        Router::new().route("/playlist.m3u", get(Self::playlist))
    }

    async fn playlist(ctx: ClientContext, Query(query): Query<ChannelQuery>) -> Response {
        let channels = ctx.services.channels.search_channels(&query);
        let body = render_playlist(
            &channels,
            &ctx.base_url,
            &ctx.services.config.user_agent,
            Utc::now(),
        );

        let headers = [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/vnd.apple.mpegurl"),
            ),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"channels.m3u\""),
            ),
        ];

        (StatusCode::OK, headers, body).into_response()
    }
}
