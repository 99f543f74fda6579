//! Error types for the agent crate.

use thiserror::Error;

use magpie_provider::ProviderError;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that terminate a turn.
///
/// Tool failures never appear here: the registry turns them into
/// result text the model can react to, and the loop continues.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The loop hit its iteration ceiling without terminating.
    #[error("max iterations ({0}) exceeded")]
    MaxIterations(u32),

    /// The provider call failed at the transport or HTTP level.
    #[error(transparent)]
    Provider(ProviderError),

    /// The pre-send hook vetoed the request.
    #[error("turn aborted by hook: {0}")]
    HookVeto(String),

    /// The turn was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// A tool implementation failed internally.
    #[error("tool error: {0}")]
    Tool(String),
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => AgentError::Cancelled,
            other => AgentError::Provider(other),
        }
    }
}

/// Error returned by a lifecycle hook.
///
/// Every hook is best-effort (a failure is logged and ignored) except
/// `on_llm_request`, whose error aborts the turn.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type for hooks.
pub type HookResult = std::result::Result<(), HookError>;
