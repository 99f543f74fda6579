//! Records owned by the storage port: sessions, transcript messages,
//! skills, and scheduled tasks.

use serde::{Deserialize, Serialize};

use crate::message::{Role, ToolCall};
use crate::{Timestamp, now};

// ─────────────────────────────────────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────────────────────────────────────

/// A conversation session, identified by `(channel, chat_id)`.
///
/// Created on first inbound for that identity; the core never deletes
/// sessions (retention is the storage owner's concern).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: i64,
    pub channel: String,
    pub chat_id: String,
    pub user_id: String,
    /// Index of the last message included in a consolidation pass.
    pub last_consolidated: i64,
    /// Free-form metadata blob.
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transcript messages
// ─────────────────────────────────────────────────────────────────────────────

/// A persisted transcript message, totally ordered per session by
/// monotonic timestamp (ties broken by id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub created_at: Timestamp,
}

impl StoredMessage {
    /// Create an unsaved message (id 0 until the storage port assigns one).
    pub fn new(session_id: i64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            session_id,
            role,
            content: content.into(),
            reasoning_content: None,
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            created_at: now(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        if !reasoning.is_empty() {
            self.reasoning_content = Some(reasoning);
        }
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        if !calls.is_empty() {
            self.tool_calls = Some(calls);
        }
        self
    }

    pub fn with_tool_result(
        mut self,
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self.tool_name = Some(tool_name.into());
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Skills
// ─────────────────────────────────────────────────────────────────────────────

/// A named prompt fragment injected into the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: i64,
    pub name: String,
    pub prompt: String,
    /// Always-loaded skills are appended to every turn's system prompt.
    pub always_on: bool,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SkillRecord {
    /// Create an unsaved skill.
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        let now = now();
        Self {
            id: 0,
            name: name.into(),
            prompt: prompt.into(),
            always_on: false,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn always_on(mut self) -> Self {
        self.always_on = true;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scheduled tasks
// ─────────────────────────────────────────────────────────────────────────────

/// A cron-scheduled synthetic message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub name: String,
    /// Five-field cron expression.
    pub cron_expr: String,
    /// Message content published when the task fires.
    pub message: String,
    pub channel: String,
    pub chat_id: String,
    pub enabled: bool,
    pub created_at: Timestamp,
}

impl TaskRecord {
    /// Create an unsaved task.
    pub fn new(
        name: impl Into<String>,
        cron_expr: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            cron_expr: cron_expr.into(),
            message: message.into(),
            channel: "cron".to_string(),
            chat_id: "cron".to_string(),
            enabled: true,
            created_at: now(),
        }
    }
}
