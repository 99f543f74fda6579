//! Error types for the server crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Result type alias using the server error type.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid webhook signature.
    #[error("unauthorized")]
    Unauthorized,

    /// The requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The agent did not answer within the request deadline.
    #[error("timed out waiting for the agent")]
    Timeout,

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] magpie_storage::StorageError),

    /// Anything else.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ServerError::Storage(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
