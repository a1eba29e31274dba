// the manifest service does the fetching and rewriting, this just turns what it hands back into
// responses a player is happy with
use axum::{
    Router,
    body::Body,
    extract::Query,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, error};

use crate::server::{
    error::{AppResult, Error},
    extractors::ClientContext,
    services::manifest_services::{ContentClass, ProxiedContent},
    utils::compression_utils::ContentEncoding,
};

#[derive(Deserialize)]
struct ProxyQuery {
    url: String,
    #[serde(rename = "type", default)]
    class: ContentClass,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new().route("/proxy", get(Self::proxy_get).options(Self::proxy_options))
    }

    fn cors_headers(headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("*"),
        );
    }

    /// playlist with no-cache and optional compression toward the client
    fn build_m3u8_response(body: Vec<u8>, request_headers: &HeaderMap) -> AppResult<Response> {
        // apple hls likes gzip, not zstd
        let encoding = ContentEncoding::from_accept_encoding(
            request_headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.apple.mpegurl"),
        );
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        Self::cors_headers(&mut response_headers);

        let response_body = match encoding.as_header_value() {
            Some(enc_header) => {
                let compressed = encoding.compress(&body).map_err(|e| {
                    error!("Failed to compress response with {:?}: {}", encoding, e);
                    Error::InternalServerErrorWithContext(
                        "Failed to compress response".to_string(),
                    )
                })?;
                debug!(
                    "Compressed M3U8 with {:?} from {} to {} bytes",
                    encoding,
                    body.len(),
                    compressed.len()
                );
                response_headers.insert(
                    header::CONTENT_ENCODING,
                    HeaderValue::from_static(enc_header),
                );
                compressed
            }
            None => body,
        };

        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(response_body.len()));

        Ok((StatusCode::OK, response_headers, response_body).into_response())
    }

    /// segments go straight through as a stream, nothing is buffered or inspected
    fn build_segment_response(content_type: String, upstream: reqwest::Response) -> Response {
        let mut response_headers = HeaderMap::new();

        let content_type = HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("video/MP2T"));
        response_headers.insert(header::CONTENT_TYPE, content_type);
        response_headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=3600"),
        );
        Self::cors_headers(&mut response_headers);

        if let Some(length) = upstream.content_length() {
            response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        }

        let body = Body::from_stream(upstream.bytes_stream());
        (StatusCode::OK, response_headers, body).into_response()
    }

    async fn proxy_get(
        ClientContext { services, .. }: ClientContext,
        Query(params): Query<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let content = services
            .manifests
            .fetch_and_rewrite(&params.url, params.class)
            .await?;

        match content {
            ProxiedContent::Segment {
                content_type,
                upstream,
            } => Ok(Self::build_segment_response(content_type, upstream)),
            ProxiedContent::Playlist { body, rewritten } => {
                if !rewritten {
                    debug!("Serving playlist unmodified");
                }
                Self::build_m3u8_response(body, &headers)
            }
        }
    }

    async fn proxy_options() -> impl IntoResponse {
        let mut headers = HeaderMap::new();
        Self::cors_headers(&mut headers);
        (StatusCode::NO_CONTENT, headers)
    }
}
