use axum::{
    Json, Router,
    extract::Query,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tracing::info;

use crate::database::channel::ChannelQuery;
use crate::server::{
    dtos::{
        channel_dto::{ChannelStatsResponse, ChannelsResponse},
        stream_dto::{StreamFormat, StreamQuery, StreamResponse, StreamUrlQuery},
    },
    error::AppResult,
    extractors::ClientContext,
    services::manifest_services::ContentClass,
    utils::url_utils::proxy_url,
};

pub struct StreamController;

impl StreamController {
    pub fn app() -> Router {
        Router::new()
            .route("/stream", get(Self::stream))
            .route("/get-stream-url", get(Self::get_stream_url))
            .route("/channels", get(Self::channels))
            .route("/channels/stats", get(Self::channel_stats))
    }

    /// redirect by default, plain text for players and `format=url`, our own proxy for `format=hls`
    async fn stream(ctx: ClientContext, Query(query): Query<StreamQuery>) -> AppResult<Response> {
        let resolved = ctx.services.streams.resolve(&query.id).await?;

        if query.format == StreamFormat::Url || ctx.is_media_player() {
            info!(channel_id = %query.id, "Returning stream url as text");
            let headers = [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )];
            return Ok((StatusCode::OK, headers, resolved.stream_url).into_response());
        }

        if query.format == StreamFormat::Hls {
            let location = proxy_url(
                &ctx.base_url,
                &resolved.stream_url,
                ContentClass::Master.as_str(),
            );
            return Ok(Self::found(location));
        }

        Ok(Self::found(resolved.stream_url))
    }

    // plain 302, some players don't follow a 303
    fn found(location: String) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
    }

    async fn get_stream_url(
        ctx: ClientContext,
        Query(query): Query<StreamUrlQuery>,
    ) -> AppResult<Json<StreamResponse>> {
        let resolved = ctx.services.streams.resolve(&query.id).await?;

        Ok(Json(StreamResponse {
            success: true,
            cached: resolved.cached(),
            base_url: resolved.channel.url.clone(),
            stream_url: resolved.stream_url,
            source: resolved.source,
            expires_in: resolved.expires_in,
            channel: resolved.channel,
        }))
    }

    async fn channels(
        ctx: ClientContext,
        Query(query): Query<ChannelQuery>,
    ) -> Json<ChannelsResponse> {
        let channels = ctx.services.channels.search_channels(&query);

        Json(ChannelsResponse {
            success: true,
            total: channels.len(),
            channels,
        })
    }

    async fn channel_stats(ctx: ClientContext) -> Json<ChannelStatsResponse> {
        let channels = &ctx.services.channels;

        Json(ChannelStatsResponse {
            total_channels: channels.get_all_channels().len(),
            genres: channels.get_genres(),
            languages: channels.get_languages(),
            countries: channels.get_countries(),
        })
    }
}
