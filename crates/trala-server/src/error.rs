//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Could not connect to API: {0}")]
    Upstream(#[source] reqwest::Error),

    #[error("Received non-200 status {status} from {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Invalid JSON from API: {0}")]
    UpstreamDecode(#[source] reqwest::Error),

    #[error("Invalid upstream URL: {0}")]
    UpstreamUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] trala_core::Error),

    #[error("Resolver error: {0}")]
    Resolver(#[from] trala_resolver::ResolverError),

    #[error("{0}")]
    Unhealthy(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::UpstreamStatus { .. } => StatusCode::BAD_GATEWAY,
            ServerError::UpstreamDecode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::UpstreamUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Resolver(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Unhealthy(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
