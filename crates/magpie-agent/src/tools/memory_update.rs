//! Memory-writing tool behind a narrow capability interface.
//!
//! The tool needs to write back into the agent's long-term memory, which
//! would otherwise create a cycle between the agent and its tools. It
//! depends on [`MemoryCapability`] instead of any concrete runtime type;
//! the runtime injects an implementation at wiring time.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::tool::{Tool, ToolContext};

/// The minimal surface a memory-writing tool needs.
#[async_trait]
pub trait MemoryCapability: Send + Sync {
    /// Update the agent's own persistent notes ("soul").
    async fn update_soul(&self, content: &str) -> Result<()>;

    /// Update the per-user memory record.
    async fn update_user(&self, user_id: &str, content: &str) -> Result<()>;
}

/// Shared reference to a memory capability.
pub type SharedMemoryCapability = Arc<dyn MemoryCapability>;

/// Lets the model persist long-term notes about itself or the user.
pub struct MemoryUpdateTool {
    memory: SharedMemoryCapability,
}

impl MemoryUpdateTool {
    pub fn new(memory: SharedMemoryCapability) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for MemoryUpdateTool {
    fn name(&self) -> &str {
        "memory_update"
    }

    fn description(&self) -> &str {
        "Persist a long-term note. Target 'soul' for agent notes or 'user' for notes about the current user."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "enum": ["soul", "user"],
                    "description": "Which memory to update"
                },
                "content": {
                    "type": "string",
                    "description": "The note to persist"
                }
            },
            "required": ["target", "content"]
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let target = args
            .get("target")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::Tool("missing required parameter 'target'".to_string()))?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::Tool("missing required parameter 'content'".to_string()))?;

        match target {
            "soul" => {
                self.memory.update_soul(content).await?;
                Ok("soul memory updated".to_string())
            }
            "user" => {
                self.memory.update_user(&ctx.user_id, content).await?;
                Ok(format!("user memory updated for {}", ctx.user_id))
            }
            other => Err(AgentError::Tool(format!(
                "unknown target '{}', expected 'soul' or 'user'",
                other
            ))),
        }
    }
}
