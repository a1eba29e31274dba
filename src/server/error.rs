use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // credential pipeline
    #[error("platform token extraction failed: {0}")]
    TokenExtractionFailed(String),

    #[error("upstream api error: {0}")]
    UpstreamApi(String),

    #[error("upstream timed out: {0}")]
    UpstreamTimeout(String),

    #[error("upstream kept rejecting the platform token after a retry")]
    AuthRetryExhausted,

    #[error("hdntl credential not found in manifest body")]
    CredentialNotFoundInManifest,

    #[error("no credential available")]
    NoCredentialAvailable,

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    // what a stream request gets when nothing could be derived, never a bare url
    #[error("stream unavailable: {0}")]
    StreamUnavailable(String),

    // general http stuff
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal server error")]
    InternalServerError,

    #[error("internal server error: {0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    /// reqwest errors come from every upstream call, timeouts get their own variant so the
    /// caller can tell a slow platform apart from a broken one
    pub fn from_upstream(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::UpstreamTimeout(format!("{}: {}", context, err))
        } else {
            Error::UpstreamApi(format!("{}: {}", context, err))
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::TokenExtractionFailed(_)
            | Error::UpstreamApi(_)
            | Error::AuthRetryExhausted
            | Error::CredentialNotFoundInManifest => StatusCode::BAD_GATEWAY,
            Error::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::NoCredentialAvailable | Error::StreamUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::ResourceNotFound(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::InternalServerError | Error::InternalServerErrorWithContext(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Error::TokenExtractionFailed(_) => "token_extraction_failed",
            Error::UpstreamApi(_) => "upstream_api_error",
            Error::UpstreamTimeout(_) => "upstream_timeout",
            Error::AuthRetryExhausted => "auth_retry_exhausted",
            Error::CredentialNotFoundInManifest => "credential_not_found_in_manifest",
            Error::NoCredentialAvailable => "no_credential_available",
            Error::ResourceNotFound(_) => "resource_not_found",
            Error::StreamUnavailable(_) => "stream_unavailable",
            Error::BadRequest(_) => "bad_request",
            Error::NotFound(_) => "not_found",
            Error::InternalServerError | Error::InternalServerErrorWithContext(_) => {
                "internal_server_error"
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!("request failed with {}: {}", status, self);
        }

        let body = Json(json!({
            "error": self.kind(),
            "detail": self.to_string(),
        }));

        (status, body).into_response()
    }
}
