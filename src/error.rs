use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Media tool not found: {0}")]
    ToolMissing(String),

    #[error("Process failure: {0}")]
    ProcessFailure(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status this error maps to when surfaced to a caller
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UpstreamUnavailable(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamStatus { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::ToolMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;
