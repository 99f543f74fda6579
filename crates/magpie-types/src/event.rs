//! Bus event types: inbound requests and outbound stream events.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Id, Timestamp, new_id, now};

/// Metadata keys the core recognizes. Unknown keys pass through untouched.
pub mod meta_keys {
    /// WebSocket client correlation (string).
    pub const CLIENT_ID: &str = "client_id";
    /// SSE request correlation (string).
    pub const STREAM_ID: &str = "stream_id";
    /// Marks an inbound that originated from the streaming REST endpoint (bool).
    pub const REST_STREAM: &str = "rest_stream";
    /// Upstream message identifier (string).
    pub const MESSAGE_ID: &str = "message_id";
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// A user message entering the system through a channel adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Id,
    /// Originating channel name ("websocket", "webhook", "rest", "cli", "cron").
    pub channel: String,
    pub chat_id: String,
    pub user_id: String,
    pub content: String,
    pub timestamp: Timestamp,
    /// Per-request correlation bag; see [`meta_keys`].
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl InboundMessage {
    /// Create an inbound message with a fresh id and timestamp.
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            timestamp: now(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The WebSocket client this request came from, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.metadata.get(meta_keys::CLIENT_ID).and_then(Value::as_str)
    }

    /// The SSE stream this request correlates to, if any.
    pub fn stream_id(&self) -> Option<&str> {
        self.metadata.get(meta_keys::STREAM_ID).and_then(Value::as_str)
    }

    /// Whether this inbound originated from the streaming REST endpoint.
    pub fn is_rest_stream(&self) -> bool {
        self.metadata
            .get(meta_keys::REST_STREAM)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Discriminant of an outbound stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    /// Incremental user-visible content.
    Chunk,
    /// Incremental reasoning text.
    Thinking,
    /// Terminal event closing a turn's stream.
    End,
    /// Turn failure.
    Error,
    /// A complete standalone message.
    Message,
    /// A tool is being invoked.
    ToolCall,
    /// A tool finished.
    ToolResult,
}

/// An event flowing from the agent back to channel adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    pub channel: String,
    pub chat_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub timestamp: Timestamp,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl OutboundMessage {
    fn base(kind: OutboundKind, channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            kind,
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: None,
            thinking: None,
            tool_name: None,
            tool_call_id: None,
            arguments: None,
            status: None,
            error: None,
            timestamp: now(),
            metadata: HashMap::new(),
        }
    }

    /// A content delta event.
    pub fn chunk(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(OutboundKind::Chunk, channel, chat_id);
        msg.content = Some(content.into());
        msg
    }

    /// A reasoning delta event.
    pub fn thinking(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        thinking: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(OutboundKind::Thinking, channel, chat_id);
        msg.thinking = Some(thinking.into());
        msg
    }

    /// The terminal event for a turn.
    pub fn end(channel: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self::base(OutboundKind::End, channel, chat_id)
    }

    /// A turn failure event.
    pub fn error(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(OutboundKind::Error, channel, chat_id);
        msg.error = Some(error.into());
        msg
    }

    /// A complete standalone message.
    pub fn message(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(OutboundKind::Message, channel, chat_id);
        msg.content = Some(content.into());
        msg
    }

    /// A tool invocation notification.
    pub fn tool_call(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(OutboundKind::ToolCall, channel, chat_id);
        msg.tool_name = Some(tool_name.into());
        msg.arguments = Some(arguments.into());
        msg
    }

    /// A tool completion notification.
    pub fn tool_result(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        tool_name: impl Into<String>,
        status: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::base(OutboundKind::ToolResult, channel, chat_id);
        msg.tool_name = Some(tool_name.into());
        msg.status = Some(status.into());
        msg.content = Some(content.into());
        msg
    }

    /// Copy the correlation metadata of an inbound message onto this event.
    pub fn correlated_with(mut self, inbound: &InboundMessage) -> Self {
        self.metadata = inbound.metadata.clone();
        self
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The WebSocket client this event targets, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.metadata.get(meta_keys::CLIENT_ID).and_then(Value::as_str)
    }

    /// The SSE stream this event targets, if any.
    pub fn stream_id(&self) -> Option<&str> {
        self.metadata.get(meta_keys::STREAM_ID).and_then(Value::as_str)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
