//! Tool framework for agent capabilities.
//!
//! This module defines the [`Tool`] trait that all agent tools implement
//! and the [`ToolRegistry`] that dispatches model-issued [`ToolCall`]s.
//! The registry never errors outward: lookup failures, argument parse
//! failures, and tool failures all become a [`ToolResult`] carrying error
//! text the model can react to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use magpie_provider::ToolDefinition;
use magpie_types::ToolCall;

use crate::error::{AgentError, Result};

/// Tool names reserved for the built-in set. Dynamically created tools
/// cannot claim these.
pub const RESERVED_TOOL_NAMES: &[&str] = &[
    "file_read",
    "file_write",
    "file_edit",
    "file_delete",
    "file_list",
    "http_request",
    "web_search",
    "web_fetch",
    "calculator",
    "exec",
    "message",
    "grep",
    "find",
    "tree",
    "read_part",
    "wc",
    "create_tool",
    "delete_tool",
    "list_tools",
    "update_tool",
];

// ─────────────────────────────────────────────────────────────────────────────
// Tool Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for agent tools.
///
/// Each tool describes its input as a JSON Schema object and implements
/// async execution. Implementations should honor `ctx.cancellation` when
/// they block.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// JSON Schema for this tool's input object.
    fn parameters(&self) -> serde_json::Value;

    /// Execute the tool and return its output text.
    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Session the turn belongs to.
    pub session_id: i64,
    /// Originating channel.
    pub channel: String,
    /// Conversation identity within the channel.
    pub chat_id: String,
    /// The requesting user.
    pub user_id: String,
    /// Token to check for cancellation.
    pub cancellation: CancellationToken,
    /// Timeout for blocking executions (shell, HTTP).
    pub exec_timeout: Duration,
}

impl ToolContext {
    /// Create a context for a turn.
    pub fn new(
        session_id: i64,
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            cancellation: CancellationToken::new(),
            exec_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(0, "test", "test", "test")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Result
// ─────────────────────────────────────────────────────────────────────────────

/// Result of dispatching one tool call. Exactly one exists per issued call
/// within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    /// A successful result.
    pub fn ok(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            error: None,
        }
    }

    /// A failed result.
    pub fn error(tool_call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            content: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Text placed in the tool message: the content, or `"Error: "` plus
    /// the failure for the model to react to.
    pub fn to_message_text(&self) -> String {
        match &self.error {
            Some(e) => format!("Error: {}", e),
            None => self.content.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry mapping tool names to implementations.
///
/// Read-mostly: dispatch takes a read lock, registration a write lock.
/// Registering over an existing name replaces it (last write wins).
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in tool.
    pub fn register<T: Tool + 'static>(&self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    /// Register a built-in tool from an Arc.
    pub fn register_arc(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().insert(name, tool);
    }

    /// Register a dynamically created tool.
    ///
    /// Reserved names are rejected so user-defined tools cannot shadow the
    /// built-in set.
    pub fn register_dynamic(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if RESERVED_TOOL_NAMES.contains(&name.as_str()) {
            return Err(AgentError::Tool(format!(
                "tool name '{}' is reserved",
                name
            )));
        }
        self.tools.write().insert(name, tool);
        Ok(())
    }

    /// Remove a tool by name. Returns whether it existed.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// All registered tools, in unspecified order.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.read().values().cloned().collect()
    }

    /// Names of all registered tools, in unspecified order.
    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Render the model-facing definition list.
    pub fn to_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .read()
            .values()
            .map(|tool| ToolDefinition::new(tool.name(), tool.description(), tool.parameters()))
            .collect()
    }

    /// Dispatch a tool call.
    ///
    /// Never errors: unknown tools, malformed arguments, and execution
    /// failures all come back as `ToolResult.error`.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.get(call.name()) else {
            return ToolResult::error(&call.id, format!("tool not found: {}", call.name()));
        };

        let args: serde_json::Value = match serde_json::from_str(call.arguments()) {
            Ok(value) => value,
            Err(e) => {
                return ToolResult::error(
                    &call.id,
                    format!("failed to parse tool arguments: {}", e),
                );
            }
        };
        if !args.is_object() {
            return ToolResult::error(
                &call.id,
                format!("tool arguments must be a JSON object, got: {}", args),
            );
        }

        tracing::debug!(tool = %call.name(), tool_call_id = %call.id, "Executing tool");

        match tool.execute(args, ctx).await {
            Ok(content) => ToolResult::ok(&call.id, content),
            Err(e) => {
                tracing::warn!(tool = %call.name(), error = %e, "Tool execution failed");
                ToolResult::error(&call.id, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock Tool (for testing)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::MockTool;

#[cfg(any(test, feature = "testing"))]
mod mock {
    use super::*;
    use std::sync::Mutex;

    /// A mock tool returning a configurable response and recording calls.
    pub struct MockTool {
        name: String,
        description: String,
        response: Mutex<std::result::Result<String, String>>,
        calls: Mutex<Vec<serde_json::Value>>,
    }

    impl MockTool {
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                description: "A mock tool for testing".to_string(),
                response: Mutex::new(Ok("mock response".to_string())),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Set the success text this tool returns.
        pub fn returning(self, content: impl Into<String>) -> Self {
            *self.response.lock().unwrap() = Ok(content.into());
            self
        }

        /// Make every execution fail with this message.
        pub fn failing(self, message: impl Into<String>) -> Self {
            *self.response.lock().unwrap() = Err(message.into());
            self
        }

        /// Arguments recorded across all executions.
        pub fn calls(&self) -> Vec<serde_json::Value> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            &self.description
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<String> {
            self.calls.lock().unwrap().push(args);
            self.response
                .lock()
                .unwrap()
                .clone()
                .map_err(AgentError::Tool)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_success() {
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("echo").returning("hello back"));

        let call = ToolCall::function("c1", "echo", "{}");
        let result = registry.execute(&call, &ToolContext::default()).await;

        assert!(result.is_success());
        assert_eq!(result.tool_call_id, "c1");
        assert_eq!(result.content, "hello back");
        assert_eq!(result.to_message_text(), "hello back");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let call = ToolCall::function("c1", "missing", "{}");
        let result = registry.execute(&call, &ToolContext::default()).await;

        assert!(!result.is_success());
        assert!(result.error.as_ref().unwrap().contains("tool not found"));
    }

    #[tokio::test]
    async fn test_execute_bad_arguments() {
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("echo"));

        // Not JSON at all
        let call = ToolCall::function("c1", "echo", "not json");
        let result = registry.execute(&call, &ToolContext::default()).await;
        assert!(result.error.as_ref().unwrap().contains("parse"));

        // JSON but not an object
        let call = ToolCall::function("c2", "echo", "[1,2,3]");
        let result = registry.execute(&call, &ToolContext::default()).await;
        assert!(result.error.as_ref().unwrap().contains("JSON object"));
    }

    #[tokio::test]
    async fn test_execute_tool_failure_becomes_result() {
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("boom").failing("disk on fire"));

        let call = ToolCall::function("c1", "boom", "{}");
        let result = registry.execute(&call, &ToolContext::default()).await;

        assert!(!result.is_success());
        assert_eq!(result.to_message_text(), "Error: tool error: disk on fire");
    }

    #[test]
    fn test_register_last_write_wins() {
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("dup").returning("first"));
        registry.register(MockTool::new("dup").returning("second"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_dynamic_rejects_reserved() {
        let registry = ToolRegistry::new();
        let err = registry
            .register_dynamic(Arc::new(MockTool::new("calculator")))
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));

        registry
            .register_dynamic(Arc::new(MockTool::new("my_custom_tool")))
            .unwrap();
        assert!(registry.get("my_custom_tool").is_some());
    }

    #[test]
    fn test_to_definitions() {
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("alpha"));
        registry.register(MockTool::new("beta"));

        let defs = registry.to_definitions();
        assert_eq!(defs.len(), 2);
        let mut names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_unregister() {
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("gone"));
        assert!(registry.unregister("gone"));
        assert!(!registry.unregister("gone"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let tool = MockTool::new("spy");
        let args = serde_json::json!({"x": 1});
        tool.execute(args.clone(), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(tool.call_count(), 1);
        assert_eq!(tool.calls()[0], args);
    }
}
