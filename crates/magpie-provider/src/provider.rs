//! The [`ChatProvider`] trait and the scripted mock used in tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{ChatRequest, StreamChunk};

/// Callback invoked synchronously for every decoded stream chunk.
///
/// Returning an error aborts the stream; the provider propagates it to the
/// caller unchanged.
pub type ChunkHandler<'a> = &'a mut (dyn FnMut(StreamChunk) -> Result<()> + Send);

/// A chat completion backend.
///
/// Implementations decode the wire stream into [`StreamChunk`]s and feed
/// them to the caller's handler; suspension happens only at network read
/// boundaries, with no buffering beyond one line.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Backend name for logging and the `/providers` route.
    fn name(&self) -> &str;

    /// The model used when a request does not override it.
    fn default_model(&self) -> &str;

    /// Stream a chat completion, invoking `on_chunk` per decoded chunk.
    async fn chat_stream(
        &self,
        request: ChatRequest,
        on_chunk: ChunkHandler<'_>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Shared reference to a provider backend.
pub type SharedProvider = Arc<dyn ChatProvider>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Provider (for testing)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockProvider, MockStream};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::error::ProviderError;

    /// One scripted provider call: a chunk sequence or a failure.
    #[derive(Debug, Clone)]
    pub enum MockStream {
        /// Deliver these chunks in order, then end the stream.
        Chunks(Vec<StreamChunk>),
        /// Fail the call with a transport error.
        Error(String),
    }

    /// A scripted provider for tests.
    ///
    /// Each `chat_stream` call consumes the next scripted stream; a
    /// repeating script replays the same chunks forever (used by the
    /// iteration-cap tests). Requests are recorded for assertion; calling
    /// past a finite script ends the turn with an empty stream.
    pub struct MockProvider {
        name: String,
        model: String,
        script: Mutex<VecDeque<MockStream>>,
        repeat: Option<Vec<StreamChunk>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockProvider {
        /// Create a mock with the given scripted calls.
        pub fn new(script: Vec<MockStream>) -> Self {
            Self {
                name: "mock".to_string(),
                model: "mock-model".to_string(),
                script: Mutex::new(script.into()),
                repeat: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        /// A mock whose single call streams one content chunk.
        pub fn with_text(text: impl Into<String>) -> Self {
            Self::new(vec![MockStream::Chunks(vec![StreamChunk::content(text)])])
        }

        /// A mock that replays the same chunk sequence for every call.
        pub fn repeating(chunks: Vec<StreamChunk>) -> Self {
            let mut mock = Self::new(Vec::new());
            mock.repeat = Some(chunks);
            mock
        }

        /// Number of `chat_stream` calls made so far.
        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        /// Recorded requests, in call order.
        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn next_stream(&self) -> MockStream {
            if let Some(chunks) = &self.repeat {
                return MockStream::Chunks(chunks.clone());
            }
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(MockStream::Chunks(Vec::new()))
        }
    }

    #[async_trait]
    impl ChatProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn default_model(&self) -> &str {
            &self.model
        }

        async fn chat_stream(
            &self,
            request: ChatRequest,
            on_chunk: ChunkHandler<'_>,
            cancel: CancellationToken,
        ) -> Result<()> {
            self.requests.lock().unwrap().push(request);

            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            match self.next_stream() {
                MockStream::Chunks(chunks) => {
                    for chunk in chunks {
                        on_chunk(chunk)?;
                    }
                    Ok(())
                }
                MockStream::Error(message) => Err(ProviderError::Transport(message)),
            }
        }
    }
}
