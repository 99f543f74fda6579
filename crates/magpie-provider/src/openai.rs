//! OpenAI-compatible API backend.
//!
//! Connects to OpenAI's API or any endpoint speaking the same
//! `/chat/completions` dialect (vLLM, Ollama, DeepSeek, proxies), including
//! ones that need extra headers. The SSE decoder lives here too: it turns
//! the response body into [`StreamChunk`]s, one per parsed `data:` line.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use magpie_types::ChatMessage;

use crate::error::{ProviderError, Result};
use crate::provider::{ChatProvider, ChunkHandler};
use crate::types::{ChatRequest, StreamChunk, ToolCallFragment, ToolDefinition, Usage};

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Name for this backend instance.
    pub name: String,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token (optional for local services).
    pub api_key: Option<String>,
    /// Default model.
    pub model: String,
    /// Extra headers sent with every request.
    pub extra_headers: Vec<(String, String)>,
    /// Request timeout.
    pub timeout: Duration,
}

impl OpenAiConfig {
    /// Create a config for a named endpoint.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            extra_headers: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible streaming backend.
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create a backend with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut builder = builder.header(header::CONTENT_TYPE, "application/json");

        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key));
        }

        for (name, value) in &self.config.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
    }

    fn to_wire_request(&self, request: &ChatRequest) -> WireChatRequest {
        let model = if request.model.is_empty() {
            self.config.model.clone()
        } else {
            request.model.clone()
        };

        WireChatRequest {
            model,
            messages: request.messages.clone(),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            stream: true,
            tools: if request.tools.is_empty() {
                None
            } else {
                Some(request.tools.iter().map(WireTool::from).collect())
            },
            stop: if request.stop.is_empty() {
                None
            } else {
                Some(request.stop.clone())
            },
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn default_model(&self) -> &str {
        &self.config.model
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
        on_chunk: ChunkHandler<'_>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let wire = self.to_wire_request(&request);

        tracing::debug!(
            backend = %self.config.name,
            model = %wire.model,
            messages = wire.messages.len(),
            tools = wire.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "Sending chat completion request"
        );

        let response = self
            .add_headers(self.client.post(self.completions_url()))
            .json(&wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        drive_sse_stream(response.bytes_stream(), on_chunk, cancel).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// What a single `data:` payload decoded to.
enum Payload {
    /// The `[DONE]` sentinel.
    Done,
    /// A decoded chunk.
    Chunk(StreamChunk),
    /// Not a recognized payload; skipped for forward compatibility.
    Skip,
}

/// Pump an SSE byte stream through the chunk handler.
///
/// Holds at most one partial line; each complete `data:` line either ends
/// the stream (`[DONE]`), produces exactly one [`StreamChunk`], or is
/// skipped.
async fn drive_sse_stream<S, E>(
    byte_stream: S,
    on_chunk: ChunkHandler<'_>,
    cancel: CancellationToken,
) -> Result<()>
where
    S: Stream<Item = std::result::Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut buffer = String::new();

    loop {
        // Drain complete lines already buffered.
        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim().to_string();
            buffer.drain(..=line_end);

            if line.is_empty() {
                continue;
            }

            if let Some(data) = line.strip_prefix("data: ") {
                match decode_payload(data) {
                    Payload::Done => return Ok(()),
                    Payload::Chunk(chunk) => on_chunk(chunk)?,
                    Payload::Skip => {}
                }
            }
        }

        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            next = byte_stream.next() => next,
        };

        match next {
            Some(Ok(bytes)) => buffer.push_str(&String::from_utf8_lossy(&bytes)),
            Some(Err(e)) => return Err(ProviderError::Transport(e.to_string())),
            None => return Ok(()),
        }
    }
}

/// Decode one `data:` payload.
fn decode_payload(data: &str) -> Payload {
    if data == "[DONE]" {
        return Payload::Done;
    }

    // Unparseable lines are skipped, not errors.
    let Ok(wire) = serde_json::from_str::<WireStreamChunk>(data) else {
        return Payload::Skip;
    };

    let mut chunk = StreamChunk {
        usage: wire.usage,
        ..Default::default()
    };

    if let Some(choice) = wire.choices.into_iter().next() {
        chunk.finish_reason = choice.finish_reason;

        if let Some(delta) = choice.delta {
            chunk.content_delta = delta.content.unwrap_or_default();
            chunk.reasoning_delta = delta.reasoning_content.unwrap_or_default();

            for tc in delta.tool_calls.unwrap_or_default() {
                let (name, arguments_delta) = match tc.function {
                    Some(f) => (f.name, f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                chunk.tool_call_fragments.push(ToolCallFragment {
                    index: tc.index.unwrap_or(0),
                    id: tc.id,
                    kind: tc.kind,
                    name,
                    arguments_delta,
                });
            }
        }
    }

    Payload::Chunk(chunk)
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ToolDefinition,
}

impl From<&ToolDefinition> for WireTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: def.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: Option<WireStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<WireStreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamToolCall {
    index: Option<u32>,
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    function: Option<WireStreamFunction>,
}

#[derive(Debug, Deserialize)]
struct WireStreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
