//! HTTP-facing errors for the shellcache front.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use shellcache_core::Error;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The incoming request can't be mapped onto a fetch.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// The target lies outside the scope's origin.
    #[error("FORBIDDEN_TARGET: {0}")]
    ForbiddenTarget(String),

    #[error(transparent)]
    Core(#[from] Error),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::ForbiddenTarget(_) => StatusCode::FORBIDDEN,
            ServerError::Core(Error::InvalidInput(_) | Error::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ServerError::Core(e) if e.is_network_failure() => StatusCode::BAD_GATEWAY,
            ServerError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
