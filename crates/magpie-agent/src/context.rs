//! Context assembly for a turn.
//!
//! Combines the agent's base prompt, always-loaded skills, and long-term
//! memories into a system prompt, and converts the recent session
//! transcript into model-ready messages. No model call happens here.

use magpie_types::{ChatMessage, MemoryRecord, Role, SkillRecord, StoredMessage};

/// Header introducing the memory section of the system prompt.
const MEMORY_HEADER: &str = "## Long-term Memory";

/// Builds `(messages, system_prompt)` for a turn.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    /// The agent's base system prompt.
    pub base_prompt: String,
    /// How many recent transcript messages enter the window.
    pub memory_window: usize,
}

impl ContextBuilder {
    pub fn new(base_prompt: impl Into<String>, memory_window: usize) -> Self {
        Self {
            base_prompt: base_prompt.into(),
            memory_window: memory_window.max(1),
        }
    }

    /// Assemble the turn context.
    ///
    /// The system prompt is the base prompt, each always-loaded skill's
    /// prompt block, then all memories under a `## Long-term Memory`
    /// header. Messages are the last `memory_window` transcript entries
    /// converted to the wire shape, tool fields preserved.
    pub fn build(
        &self,
        skills: &[SkillRecord],
        memories: &[MemoryRecord],
        history: &[StoredMessage],
    ) -> (Vec<ChatMessage>, String) {
        let system_prompt = self.build_system_prompt(skills, memories);

        let start = history.len().saturating_sub(self.memory_window);
        let messages = history[start..].iter().map(to_chat_message).collect();

        (messages, system_prompt)
    }

    fn build_system_prompt(&self, skills: &[SkillRecord], memories: &[MemoryRecord]) -> String {
        let mut prompt = self.base_prompt.clone();

        for skill in skills.iter().filter(|s| s.enabled && s.always_on) {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(&format!("## Skill: {}\n{}", skill.name, skill.prompt));
        }

        let live: Vec<&MemoryRecord> = memories.iter().filter(|m| !m.is_deleted).collect();
        if !live.is_empty() {
            if !prompt.is_empty() {
                prompt.push_str("\n\n");
            }
            prompt.push_str(MEMORY_HEADER);
            for memory in live {
                prompt.push_str(&format!("\n- {}", memory.content));
            }
        }

        prompt
    }
}

/// Convert a stored transcript message into the provider wire shape.
fn to_chat_message(stored: &StoredMessage) -> ChatMessage {
    let mut msg = match stored.role {
        Role::System => ChatMessage::system(&stored.content),
        Role::User => ChatMessage::user(&stored.content),
        Role::Assistant => ChatMessage::assistant(&stored.content),
        Role::Tool => ChatMessage::tool_result(
            stored.tool_call_id.clone().unwrap_or_default(),
            stored.tool_name.clone().unwrap_or_default(),
            &stored.content,
        ),
    };
    msg.reasoning_content = stored.reasoning_content.clone();
    if stored.role == Role::Assistant {
        msg.tool_calls = stored.tool_calls.clone();
    }
    msg
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
