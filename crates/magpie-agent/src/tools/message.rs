//! Tool for pushing a message to a channel through the bus.

use std::sync::Arc;

use async_trait::async_trait;

use magpie_bus::MessageBus;
use magpie_types::OutboundMessage;

use crate::error::{AgentError, Result};
use crate::tool::{Tool, ToolContext};

/// Sends a standalone outbound message to the current (or an explicit)
/// chat. Lets the model push a notification mid-turn instead of waiting
/// for the final response.
pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user immediately, before the turn finishes."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message text to send"
                },
                "chat_id": {
                    "type": "string",
                    "description": "Target chat; defaults to the current conversation"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::Tool("missing required parameter 'content'".to_string()))?;

        let chat_id = args
            .get("chat_id")
            .and_then(|v| v.as_str())
            .unwrap_or(&ctx.chat_id);

        let outbound = OutboundMessage::message(&ctx.channel, chat_id, content);
        self.bus
            .publish_outbound(outbound)
            .map_err(|e| AgentError::Tool(format!("failed to publish message: {}", e)))?;

        Ok(format!("message sent to {}", chat_id))
    }
}
