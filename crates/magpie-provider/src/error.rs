//! Error types for the provider crate.

use thiserror::Error;

/// Result type alias using the provider error type.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors raised by provider backends.
///
/// Malformed SSE payload lines are never an error: the decoder skips them
/// for forward compatibility with vendor extensions.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The endpoint answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The connection failed or broke mid-stream.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The chunk callback asked to abort the stream.
    #[error("stream consumer aborted: {0}")]
    Aborted(String),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The provider is misconfigured.
    #[error("provider configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}
