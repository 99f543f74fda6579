//! Request and stream types shared by all provider backends.

use serde::{Deserialize, Serialize};

use magpie_types::ChatMessage;

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// A model-facing tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input object.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Vec<String>,
}

impl ChatRequest {
    /// Create a request with the required fields.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            max_tokens,
            temperature: None,
            top_p: None,
            stop: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, prompt: impl Into<String>) -> Self {
        self.messages.insert(0, ChatMessage::system(prompt));
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream chunks
// ─────────────────────────────────────────────────────────────────────────────

/// Token usage reported at stream end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

/// One fragment of a streamed tool call.
///
/// Providers shard a single call across many chunks keyed by `index`:
/// consecutive fragments with the same index accumulate (`arguments_delta`
/// concatenates; the last non-empty `id`/`kind`/`name` wins).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: String,
}

/// The unit emitted by the stream decoder: one decoded SSE payload.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub content_delta: String,
    pub reasoning_delta: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub tool_call_fragments: Vec<ToolCallFragment>,
}

impl StreamChunk {
    /// A pure content delta.
    pub fn content(delta: impl Into<String>) -> Self {
        Self {
            content_delta: delta.into(),
            ..Default::default()
        }
    }

    /// A pure reasoning delta.
    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self {
            reasoning_delta: delta.into(),
            ..Default::default()
        }
    }

    /// A chunk carrying a single tool-call fragment.
    pub fn tool_fragment(fragment: ToolCallFragment) -> Self {
        Self {
            tool_call_fragments: vec![fragment],
            ..Default::default()
        }
    }

    /// True when the chunk carries nothing the loop cares about.
    pub fn is_empty(&self) -> bool {
        self.content_delta.is_empty()
            && self.reasoning_delta.is_empty()
            && self.finish_reason.is_none()
            && self.usage.is_none()
            && self.tool_call_fragments.is_empty()
    }
}
