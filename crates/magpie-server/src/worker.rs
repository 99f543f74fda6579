//! The agent worker: consumes inbound messages from the bus and runs one
//! ReAct turn per message on a freshly spawned task.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use magpie_agent::{
    AgentError, AgentHooks, ContextBuilder, HookResult, MemoryCapability, ReactConfig, ReactLoop,
    ToolContext, ToolResult, TurnOutcome,
};
use magpie_bus::MessageBus;
use magpie_storage::StorageError;
use magpie_types::{
    InboundMessage, MemoryKind, MemoryRecord, OutboundMessage, Role, StoredMessage,
};

use crate::state::AppState;

/// User-visible text for a failed turn.
const TURN_FAILED_MESSAGE: &str = "Error processing message.";

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Run the worker loop until the bus closes or the token cancels.
///
/// Each inbound message gets its own task, so many turns can be in
/// flight concurrently; within one turn the ReAct loop stays sequential.
pub async fn run_worker(state: AppState) {
    loop {
        let inbound = match state.bus.consume_inbound(&state.cancel).await {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(reason = %e, "Worker loop stopping");
                return;
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            handle_inbound(state, inbound).await;
        });
    }
}

/// Process one inbound message through a full turn.
pub async fn handle_inbound(state: AppState, inbound: InboundMessage) {
    tracing::info!(
        channel = %inbound.channel,
        chat_id = %inbound.chat_id,
        content_len = inbound.content.len(),
        "Turn started"
    );

    match process_turn(&state, &inbound).await {
        Ok(outcome) => {
            tracing::info!(
                channel = %inbound.channel,
                chat_id = %inbound.chat_id,
                iterations = outcome.iterations,
                tool_calls = outcome.tool_calls_total,
                "Turn completed"
            );
        }
        Err(TurnError::Agent(AgentError::Cancelled)) => {
            tracing::debug!(chat_id = %inbound.chat_id, "Turn cancelled");
        }
        Err(e) => {
            tracing::error!(chat_id = %inbound.chat_id, error = %e, "Turn failed");
            let _ = state.bus.publish_outbound(
                OutboundMessage::error(&inbound.channel, &inbound.chat_id, TURN_FAILED_MESSAGE)
                    .correlated_with(&inbound),
            );
        }
    }

    // Every turn closes its stream, failed or not.
    let _ = state.bus.publish_outbound(
        OutboundMessage::end(&inbound.channel, &inbound.chat_id).correlated_with(&inbound),
    );
}

async fn process_turn(
    state: &AppState,
    inbound: &InboundMessage,
) -> Result<TurnOutcome, TurnError> {
    let settings = &state.settings;

    let session = state.storage.get_or_create_session(
        &inbound.channel,
        &inbound.chat_id,
        &inbound.user_id,
    )?;

    state
        .storage
        .append_message(&StoredMessage::new(session.id, Role::User, &inbound.content))?;
    state.consolidator.increment_message_count(session.id);

    // Assemble the turn context.
    let skills = state.storage.list_skills()?;
    let memories = state.storage.list_memories(None)?;
    let history = state
        .storage
        .recent_messages(session.id, settings.memory_window)?;

    let builder = ContextBuilder::new(&settings.system_prompt, settings.memory_window);
    let (messages, system_prompt) = builder.build(&skills, &memories, &history);

    let hooks = PublishingHooks::new(state.bus.clone(), inbound.clone());
    let ctx = ToolContext::new(
        session.id,
        &inbound.channel,
        &inbound.chat_id,
        &inbound.user_id,
    )
    .with_cancellation(state.cancel.child_token())
    .with_exec_timeout(settings.exec_timeout);

    let react = ReactLoop::new(
        state.provider.clone(),
        state.tools.clone(),
        ReactConfig {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            max_iterations: settings.max_iterations,
            pair_tool_messages: true,
        },
    );

    let outcome = react
        .run(messages, Some(&system_prompt), &hooks, &ctx)
        .await?;

    // Persist the appended transcript.
    for msg in &outcome.messages {
        let mut stored = StoredMessage::new(session.id, msg.role, &msg.content);
        stored.reasoning_content = msg.reasoning_content.clone();
        stored.tool_calls = msg.tool_calls.clone();
        stored.tool_call_id = msg.tool_call_id.clone();
        stored.tool_name = msg.name.clone();
        state.storage.append_message(&stored)?;
        state.consolidator.increment_message_count(session.id);
    }

    if state.consolidator.should_consolidate(session.id) {
        if let Err(e) = state.consolidator.consolidate(state.storage.as_ref(), session.id) {
            tracing::warn!(session_id = session.id, error = %e, "Consolidation failed");
        }
    }

    Ok(outcome)
}

// ─────────────────────────────────────────────────────────────────────────────
// Publishing hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Hook set that forwards turn progress to the bus as outbound events,
/// correlated with the originating inbound message.
pub struct PublishingHooks {
    bus: Arc<MessageBus>,
    inbound: InboundMessage,
    /// Length of the reasoning buffer already emitted as thinking events.
    emitted_reasoning: Mutex<usize>,
}

impl PublishingHooks {
    pub fn new(bus: Arc<MessageBus>, inbound: InboundMessage) -> Self {
        Self {
            bus,
            inbound,
            emitted_reasoning: Mutex::new(0),
        }
    }

    fn publish(&self, msg: OutboundMessage) {
        // Outbound delivery is best-effort; a full queue must not stall
        // the turn.
        let _ = self.bus.publish_outbound(msg.correlated_with(&self.inbound));
    }
}

impl AgentHooks for PublishingHooks {
    fn on_llm_chunk(&self, content_delta: &str, reasoning_buf: &str) -> HookResult {
        {
            let mut emitted = self.emitted_reasoning.lock();
            if reasoning_buf.len() > *emitted {
                let delta = reasoning_buf[*emitted..].to_string();
                *emitted = reasoning_buf.len();
                self.publish(OutboundMessage::thinking(
                    &self.inbound.channel,
                    &self.inbound.chat_id,
                    delta,
                ));
            }
        }

        if !content_delta.is_empty() {
            self.publish(OutboundMessage::chunk(
                &self.inbound.channel,
                &self.inbound.chat_id,
                content_delta,
            ));
        }
        Ok(())
    }

    fn on_tool_call(&self, name: &str, arguments: &str) -> HookResult {
        self.publish(OutboundMessage::tool_call(
            &self.inbound.channel,
            &self.inbound.chat_id,
            name,
            arguments,
        ));
        Ok(())
    }

    fn on_tool_result(&self, name: &str, result: &ToolResult) -> HookResult {
        let status = if result.is_success() { "ok" } else { "error" };
        self.publish(OutboundMessage::tool_result(
            &self.inbound.channel,
            &self.inbound.chat_id,
            name,
            status,
            result.to_message_text(),
        ));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage-backed memory capability
// ─────────────────────────────────────────────────────────────────────────────

/// [`MemoryCapability`] implementation writing through the storage port.
///
/// Injected into the `memory_update` tool so it never needs a handle on
/// the agent or the worker.
pub struct StorageMemory {
    storage: Arc<dyn magpie_storage::Storage>,
}

impl StorageMemory {
    pub fn new(storage: Arc<dyn magpie_storage::Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl MemoryCapability for StorageMemory {
    async fn update_soul(&self, content: &str) -> magpie_agent::Result<()> {
        self.storage
            .upsert_memory(&MemoryRecord::new(MemoryKind::Memory, "soul", content))
            .map(|_| ())
            .map_err(|e| AgentError::Tool(e.to_string()))
    }

    async fn update_user(&self, user_id: &str, content: &str) -> magpie_agent::Result<()> {
        self.storage
            .upsert_memory(
                &MemoryRecord::new(MemoryKind::User, format!("user_{}", user_id), content)
                    .for_user(user_id),
            )
            .map(|_| ())
            .map_err(|e| AgentError::Tool(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerSettings;
    use magpie_agent::{MockTool, ToolRegistry};
    use magpie_memory::{Consolidator, ConsolidatorConfig};
    use magpie_provider::{MockProvider, MockStream, StreamChunk, ToolCallFragment};
    use magpie_storage::{SqliteStorage, Storage};
    use magpie_types::OutboundKind;

    fn test_state(provider: MockProvider, tools: ToolRegistry) -> AppState {
        AppState::new(
            Arc::new(MessageBus::new()),
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(provider),
            Arc::new(tools),
            Arc::new(Consolidator::new(ConsolidatorConfig::default())),
            ServerSettings::default(),
        )
    }

    fn tool_fragment_chunk(id: &str, name: &str, args: &str) -> StreamChunk {
        StreamChunk::tool_fragment(ToolCallFragment {
            index: 0,
            id: Some(id.to_string()),
            kind: Some("function".to_string()),
            name: Some(name.to_string()),
            arguments_delta: args.to_string(),
        })
    }

    #[tokio::test]
    async fn test_turn_emits_chunk_then_end() {
        let state = test_state(MockProvider::with_text("Hello"), ToolRegistry::new());
        let mut rx = state.bus.subscribe_outbound("observer");

        handle_inbound(
            state.clone(),
            InboundMessage::new("rest", "chat-1", "user-1", "hi"),
        )
        .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, OutboundKind::Chunk);
        assert_eq!(first.content.as_deref(), Some("Hello"));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.kind, OutboundKind::End);
    }

    #[tokio::test]
    async fn test_turn_persists_transcript() {
        let state = test_state(MockProvider::with_text("answer"), ToolRegistry::new());

        handle_inbound(
            state.clone(),
            InboundMessage::new("rest", "chat-1", "user-1", "question"),
        )
        .await;

        let session = state
            .storage
            .get_or_create_session("rest", "chat-1", "user-1")
            .unwrap();
        let messages = state.storage.recent_messages(session.id, 10).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "question");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "answer");
    }

    #[tokio::test]
    async fn test_tool_turn_emits_tool_events_and_pairs_messages() {
        let provider = MockProvider::new(vec![
            MockStream::Chunks(vec![tool_fragment_chunk("c1", "lookup", "{}")]),
            MockStream::Chunks(vec![StreamChunk::content("found it")]),
        ]);
        let tools = ToolRegistry::new();
        tools.register(MockTool::new("lookup").returning("data"));

        let state = test_state(provider, tools);
        let mut rx = state.bus.subscribe_outbound("observer");

        handle_inbound(
            state.clone(),
            InboundMessage::new("rest", "chat-1", "user-1", "find"),
        )
        .await;

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                OutboundKind::ToolCall,
                OutboundKind::ToolResult,
                OutboundKind::Chunk,
                OutboundKind::End,
            ]
        );

        // Transcript: user, assistant-with-call, tool, final assistant.
        let session = state
            .storage
            .get_or_create_session("rest", "chat-1", "user-1")
            .unwrap();
        let messages = state.storage.recent_messages(session.id, 10).unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].tool_calls.as_ref().unwrap()[0].id, "c1");
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_failed_turn_emits_error_then_end() {
        let provider = MockProvider::new(vec![MockStream::Error("upstream down".to_string())]);
        let state = test_state(provider, ToolRegistry::new());
        let mut rx = state.bus.subscribe_outbound("observer");

        handle_inbound(
            state.clone(),
            InboundMessage::new("rest", "chat-1", "user-1", "hi"),
        )
        .await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, OutboundKind::Error);
        assert_eq!(first.error.as_deref(), Some(TURN_FAILED_MESSAGE));
        assert_eq!(rx.recv().await.unwrap().kind, OutboundKind::End);
    }

    #[tokio::test]
    async fn test_thinking_events_carry_deltas() {
        let provider = MockProvider::new(vec![MockStream::Chunks(vec![StreamChunk::content(
            "<think>plan</think>answer",
        )])]);
        let state = test_state(provider, ToolRegistry::new());
        let mut rx = state.bus.subscribe_outbound("observer");

        handle_inbound(
            state.clone(),
            InboundMessage::new("rest", "chat-1", "user-1", "solve"),
        )
        .await;

        let thinking = rx.recv().await.unwrap();
        assert_eq!(thinking.kind, OutboundKind::Thinking);
        assert_eq!(thinking.thinking.as_deref(), Some("plan"));

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.kind, OutboundKind::Chunk);
        assert_eq!(chunk.content.as_deref(), Some("<think>plan</think>answer"));

        assert_eq!(rx.recv().await.unwrap().kind, OutboundKind::End);
    }

    #[tokio::test]
    async fn test_events_correlate_with_inbound_metadata() {
        let state = test_state(MockProvider::with_text("hi"), ToolRegistry::new());
        let mut rx = state.bus.subscribe_outbound("observer");

        let inbound = InboundMessage::new("rest", "chat-1", "user-1", "hello")
            .with_meta(magpie_types::meta_keys::STREAM_ID, "s-1")
            .with_meta(magpie_types::meta_keys::REST_STREAM, true);
        handle_inbound(state.clone(), inbound).await;

        let chunk = rx.recv().await.unwrap();
        assert_eq!(chunk.stream_id(), Some("s-1"));
        let end = rx.recv().await.unwrap();
        assert_eq!(end.stream_id(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_consolidation_triggers_at_threshold() {
        let provider = MockProvider::repeating(vec![StreamChunk::content("ok")]);
        let state = AppState::new(
            Arc::new(MessageBus::new()),
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(provider),
            Arc::new(ToolRegistry::new()),
            Arc::new(Consolidator::new(ConsolidatorConfig {
                threshold: 4,
                ..Default::default()
            })),
            ServerSettings::default(),
        );

        // Each turn adds two messages (user + assistant); two turns cross
        // the threshold of 4.
        for i in 0..2 {
            handle_inbound(
                state.clone(),
                InboundMessage::new("rest", "chat-1", "user-1", format!("msg {}", i)),
            )
            .await;
        }

        let session = state
            .storage
            .get_or_create_session("rest", "chat-1", "user-1")
            .unwrap();
        let summary = state
            .storage
            .get_memory_by_key(&format!("summary_{}", session.id))
            .unwrap();
        assert!(summary.is_some());
        assert_eq!(state.consolidator.message_count(session.id), 0);
    }

    #[tokio::test]
    async fn test_storage_memory_capability() {
        let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open_in_memory().unwrap());
        let capability = StorageMemory::new(storage.clone());

        capability.update_soul("stay curious").await.unwrap();
        capability.update_user("u-9", "prefers emoji").await.unwrap();

        let soul = storage.get_memory_by_key("soul").unwrap().unwrap();
        assert_eq!(soul.content, "stay curious");

        let user = storage.get_memory_by_key("user_u-9").unwrap().unwrap();
        assert_eq!(user.kind, MemoryKind::User);
        assert_eq!(user.user_id.as_deref(), Some("u-9"));
    }
}
