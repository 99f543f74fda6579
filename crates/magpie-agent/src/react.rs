//! The ReAct loop: the per-turn state machine that alternates between a
//! streaming model call and tool dispatch.
//!
//! Each iteration reassembles fragmented stream output (content, reasoning,
//! and tool-call fragments sharded by index) into a coherent assistant
//! turn, then either terminates (no tool calls) or dispatches every call
//! and loops. Lifecycle hooks observe the turn; only `on_llm_request` can
//! abort it.

use std::collections::BTreeMap;
use std::sync::Arc;

use magpie_provider::{
    ChatRequest, SharedProvider, StreamChunk, ToolCallFragment, Usage, thinking,
};
use magpie_types::{ChatMessage, ToolCall};

use crate::error::{AgentError, HookResult, Result};
use crate::tool::{ToolContext, ToolRegistry, ToolResult};

// ─────────────────────────────────────────────────────────────────────────────
// Hooks
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle hooks observing a turn.
///
/// Every hook is best-effort: a failure is logged and the loop continues.
/// The single exception is [`AgentHooks::on_llm_request`], the pre-send
/// veto point; its error aborts the turn.
pub trait AgentHooks: Send + Sync {
    fn on_iteration_start(&self, _iteration: u32, _messages: &[ChatMessage]) -> HookResult {
        Ok(())
    }

    /// Fired before each provider call. The only hook whose error aborts
    /// the turn.
    fn on_llm_request(&self, _request: &ChatRequest, _iteration: u32) -> HookResult {
        Ok(())
    }

    /// Fired per stream chunk with the clean content delta and the full
    /// reasoning buffer accumulated so far.
    fn on_llm_chunk(&self, _content_delta: &str, _reasoning_buf: &str) -> HookResult {
        Ok(())
    }

    fn on_llm_response(
        &self,
        _content: &str,
        _reasoning: &str,
        _tool_calls: &[ToolCall],
        _iteration: u32,
    ) -> HookResult {
        Ok(())
    }

    fn on_tool_call(&self, _name: &str, _arguments: &str) -> HookResult {
        Ok(())
    }

    fn on_tool_result(&self, _name: &str, _result: &ToolResult) -> HookResult {
        Ok(())
    }

    fn on_iteration_end(&self, _iteration: u32, _continuing: bool) -> HookResult {
        Ok(())
    }

    fn on_complete(&self, _content: &str, _reasoning: &str, _iterations: u32) -> HookResult {
        Ok(())
    }
}

/// Hooks that do nothing.
pub struct NoopHooks;

impl AgentHooks for NoopHooks {}

/// Log-and-ignore wrapper for best-effort hooks.
fn fire(hook: &'static str, result: HookResult) {
    if let Err(e) = result {
        tracing::warn!(hook, error = %e, "Hook failed, continuing");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for a [`ReactLoop`].
#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// Model override; empty uses the provider's configured default.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    /// Hard ceiling on provider calls per turn. Clamped to at least 1.
    pub max_iterations: u32,
    /// When true (the default, matching the observed upstream behavior),
    /// the assistant-with-tool-call message is appended once per call,
    /// duplicating the content across appends when an iteration issues
    /// several calls. When false a single assistant message carries all of
    /// an iteration's calls.
    pub pair_tool_messages: bool,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: None,
            max_tokens: 4096,
            max_iterations: 20,
            pair_tool_messages: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// The result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant content (accumulated clean deltas, tags included).
    pub content: String,
    /// Accumulated reasoning text.
    pub reasoning: String,
    /// Messages appended during the turn: one (assistant, tool) pair per
    /// tool call plus the final content-only assistant message.
    pub messages: Vec<ChatMessage>,
    /// Total tool calls issued across all iterations.
    pub tool_calls_total: usize,
    /// Provider calls made.
    pub iterations: u32,
    /// Accumulated token usage where the provider reported it.
    pub usage: Usage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Partial tool-call reassembly
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulator for one sharded tool call, keyed by stream index.
#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    kind: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    /// Fold one fragment in: arguments concatenate, last non-empty
    /// id/kind/name wins.
    fn merge(&mut self, fragment: &ToolCallFragment) {
        if let Some(id) = &fragment.id
            && !id.is_empty()
        {
            self.id = id.clone();
        }
        if let Some(kind) = &fragment.kind
            && !kind.is_empty()
        {
            self.kind = kind.clone();
        }
        if let Some(name) = &fragment.name
            && !name.is_empty()
        {
            self.name = name.clone();
        }
        self.arguments.push_str(&fragment.arguments_delta);
    }

    fn into_tool_call(self) -> ToolCall {
        let mut call = ToolCall::function(self.id, self.name, self.arguments);
        if !self.kind.is_empty() {
            call.kind = self.kind;
        }
        call
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ReAct Loop
// ─────────────────────────────────────────────────────────────────────────────

/// The per-turn state machine.
pub struct ReactLoop {
    provider: SharedProvider,
    tools: Arc<ToolRegistry>,
    config: ReactConfig,
}

impl ReactLoop {
    pub fn new(provider: SharedProvider, tools: Arc<ToolRegistry>, config: ReactConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &ReactConfig {
        &self.config
    }

    /// Run one turn over the given prior messages.
    ///
    /// The turn executes on a single logical task: iterations are strictly
    /// sequential, as is tool dispatch within an iteration.
    pub async fn run(
        &self,
        mut messages: Vec<ChatMessage>,
        system_prompt: Option<&str>,
        hooks: &dyn AgentHooks,
        ctx: &ToolContext,
    ) -> Result<TurnOutcome> {
        let max_iterations = self.config.max_iterations.max(1);
        let turn_start = messages.len();
        let mut tool_calls_total = 0usize;
        let mut total_usage = Usage::default();

        for iteration in 1..=max_iterations {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            fire("on_iteration_start", hooks.on_iteration_start(iteration, &messages));

            let request = self.build_request(&messages, system_prompt);
            hooks
                .on_llm_request(&request, iteration)
                .map_err(|e| AgentError::HookVeto(e.to_string()))?;

            // Per-iteration state, reset each pass.
            let mut content_buf = String::new();
            let mut reasoning_buf = String::new();
            let mut partial: BTreeMap<u32, PartialToolCall> = BTreeMap::new();

            {
                let mut handler = |chunk: StreamChunk| -> magpie_provider::Result<()> {
                    if !chunk.reasoning_delta.is_empty() {
                        reasoning_buf.push_str(&chunk.reasoning_delta);
                        fire("on_llm_chunk", hooks.on_llm_chunk("", &reasoning_buf));
                    }

                    if !chunk.content_delta.is_empty() {
                        // Reasoning arrived separately above, so the
                        // extractor only hunts for inline tags here.
                        let (clean, thinking_delta) = thinking::extract(&chunk.content_delta, "");
                        if !thinking_delta.is_empty() {
                            reasoning_buf.push_str(thinking_delta);
                        }
                        fire("on_llm_chunk", hooks.on_llm_chunk(clean, &reasoning_buf));
                        content_buf.push_str(clean);
                    }

                    for fragment in &chunk.tool_call_fragments {
                        partial.entry(fragment.index).or_default().merge(fragment);
                    }

                    if let Some(usage) = chunk.usage {
                        total_usage.prompt_tokens += usage.prompt_tokens;
                        total_usage.completion_tokens += usage.completion_tokens;
                    }

                    Ok(())
                };

                self.provider
                    .chat_stream(request, &mut handler, ctx.cancellation.clone())
                    .await?;
            }

            // Materialize tool calls in index order.
            let tool_calls: Vec<ToolCall> = partial
                .into_values()
                .map(PartialToolCall::into_tool_call)
                .collect();

            fire(
                "on_llm_response",
                hooks.on_llm_response(&content_buf, &reasoning_buf, &tool_calls, iteration),
            );

            if tool_calls.is_empty() {
                fire("on_iteration_end", hooks.on_iteration_end(iteration, false));

                messages.push(
                    ChatMessage::assistant(&content_buf).with_reasoning(&reasoning_buf),
                );
                fire(
                    "on_complete",
                    hooks.on_complete(&content_buf, &reasoning_buf, iteration),
                );

                tracing::debug!(
                    iterations = iteration,
                    tool_calls = tool_calls_total,
                    content_len = content_buf.len(),
                    "Turn completed"
                );

                return Ok(TurnOutcome {
                    content: content_buf,
                    reasoning: reasoning_buf,
                    messages: messages.split_off(turn_start),
                    tool_calls_total,
                    iterations: iteration,
                    usage: total_usage,
                });
            }

            tracing::debug!(
                iteration,
                tool_count = tool_calls.len(),
                tools = %tool_calls.iter().map(|c| c.name()).collect::<Vec<_>>().join(", "),
                "Dispatching tools"
            );

            tool_calls_total += tool_calls.len();

            if !self.config.pair_tool_messages {
                messages.push(ChatMessage::assistant_with_tool_calls(
                    &content_buf,
                    tool_calls.clone(),
                ));
            }

            for call in &tool_calls {
                fire("on_tool_call", hooks.on_tool_call(call.name(), call.arguments()));

                let result = self.tools.execute(call, ctx).await;

                fire("on_tool_result", hooks.on_tool_result(call.name(), &result));

                if self.config.pair_tool_messages {
                    messages.push(ChatMessage::assistant_with_tool_calls(
                        &content_buf,
                        vec![call.clone()],
                    ));
                }
                messages.push(ChatMessage::tool_result(
                    &call.id,
                    call.name(),
                    result.to_message_text(),
                ));
            }

            fire("on_iteration_end", hooks.on_iteration_end(iteration, true));
        }

        tracing::warn!(max_iterations, "Max iterations exceeded");
        Err(AgentError::MaxIterations(max_iterations))
    }

    fn build_request(&self, messages: &[ChatMessage], system_prompt: Option<&str>) -> ChatRequest {
        let mut request = ChatRequest::new(
            &self.config.model,
            messages.to_vec(),
            self.config.max_tokens,
        );

        if let Some(prompt) = system_prompt
            && !prompt.is_empty()
        {
            request = request.with_system(prompt);
        }

        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        let tool_defs = self.tools.to_definitions();
        if !tool_defs.is_empty() {
            request = request.with_tools(tool_defs);
        }

        request
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::MockTool;
    use magpie_provider::{MockProvider, MockStream};
    use magpie_types::Role;
    use std::sync::Mutex;

    fn loop_with(
        provider: MockProvider,
        registry: ToolRegistry,
        config: ReactConfig,
    ) -> ReactLoop {
        ReactLoop::new(Arc::new(provider), Arc::new(registry), config)
    }

    fn tool_fragment(
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        args: &str,
    ) -> StreamChunk {
        StreamChunk::tool_fragment(ToolCallFragment {
            index,
            id: id.map(String::from),
            kind: id.map(|_| "function".to_string()),
            name: name.map(String::from),
            arguments_delta: args.to_string(),
        })
    }

    #[tokio::test]
    async fn test_no_tools_echo() {
        // S1: one content chunk, then done.
        let provider = MockProvider::new(vec![MockStream::Chunks(vec![StreamChunk::content(
            "Hello",
        )])]);
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());

        let outcome = react
            .run(
                vec![ChatMessage::user("hi")],
                None,
                &NoopHooks,
                &ToolContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.content, "Hello");
        assert_eq!(outcome.tool_calls_total, 0);
        assert_eq!(outcome.iterations, 1);
        // Exactly the final assistant message was appended.
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.messages[0].role, Role::Assistant);
        assert!(outcome.messages[0].tool_calls.is_none());
    }

    #[tokio::test]
    async fn test_inline_reasoning_extracted() {
        // S2: thinking tags stay in content, reasoning is captured.
        let provider = MockProvider::new(vec![MockStream::Chunks(vec![StreamChunk::content(
            "<think>plan</think>answer",
        )])]);
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());

        let outcome = react
            .run(
                vec![ChatMessage::user("solve it")],
                None,
                &NoopHooks,
                &ToolContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.content, "<think>plan</think>answer");
        assert_eq!(outcome.reasoning, "plan");
        assert_eq!(
            outcome.messages[0].reasoning_content.as_deref(),
            Some("plan")
        );
    }

    #[tokio::test]
    async fn test_sharded_tool_call_round_trip() {
        // S3: arguments split across two fragments, then a second
        // iteration with the final answer.
        let provider = MockProvider::new(vec![
            MockStream::Chunks(vec![
                tool_fragment(0, Some("c1"), Some("calculator"), "{\"expr"),
                tool_fragment(0, None, None, "\":\"2+2\"}"),
            ]),
            MockStream::Chunks(vec![StreamChunk::content("result is 4")]),
        ]);

        let registry = ToolRegistry::new();
        registry.register(MockTool::new("calculator").returning("4"));

        let react = loop_with(provider, registry, ReactConfig::default());
        let outcome = react
            .run(
                vec![ChatMessage::user("what is 2+2?")],
                None,
                &NoopHooks,
                &ToolContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.content, "result is 4");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls_total, 1);

        // assistant-with-call, tool result, final assistant.
        assert_eq!(outcome.messages.len(), 3);
        let assistant = &outcome.messages[0];
        assert_eq!(assistant.role, Role::Assistant);
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "c1");
        assert_eq!(calls[0].name(), "calculator");
        assert_eq!(calls[0].arguments(), "{\"expr\":\"2+2\"}");

        let tool_msg = &outcome.messages[1];
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.content, "4");

        assert!(outcome.messages[2].tool_calls.is_none());
    }

    #[tokio::test]
    async fn test_tool_failure_recovery() {
        // S4: the tool fails, the loop continues, iteration 2 happens.
        let provider = MockProvider::new(vec![
            MockStream::Chunks(vec![tool_fragment(
                0,
                Some("c1"),
                Some("flaky"),
                "{}",
            )]),
            MockStream::Chunks(vec![StreamChunk::content("I saw the failure")]),
        ]);

        let registry = ToolRegistry::new();
        registry.register(MockTool::new("flaky").failing("it broke"));

        let react = loop_with(provider, registry, ReactConfig::default());
        let outcome = react
            .run(
                vec![ChatMessage::user("try it")],
                None,
                &NoopHooks,
                &ToolContext::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.content, "I saw the failure");
        let tool_msg = &outcome.messages[1];
        assert!(tool_msg.content.starts_with("Error: "));
        assert!(tool_msg.content.contains("it broke"));
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        // S5: a provider that always issues a tool call must stop after
        // exactly max_iterations provider calls.
        let provider = MockProvider::repeating(vec![tool_fragment(
            0,
            Some("c1"),
            Some("noop"),
            "{}",
        )]);
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("noop"));

        let react = ReactLoop::new(
            Arc::new(provider),
            Arc::new(registry),
            ReactConfig {
                max_iterations: 5,
                ..Default::default()
            },
        );

        let err = react
            .run(
                vec![ChatMessage::user("loop forever")],
                None,
                &NoopHooks,
                &ToolContext::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::MaxIterations(5)));
    }

    #[tokio::test]
    async fn test_iteration_cap_counts_provider_calls() {
        let provider = Arc::new(MockProvider::repeating(vec![tool_fragment(
            0,
            Some("c1"),
            Some("noop"),
            "{}",
        )]));
        let registry = ToolRegistry::new();
        registry.register(MockTool::new("noop"));

        let react = ReactLoop::new(
            provider.clone(),
            Arc::new(registry),
            ReactConfig {
                max_iterations: 3,
                ..Default::default()
            },
        );

        let _ = react
            .run(vec![ChatMessage::user("go")], None, &NoopHooks, &ToolContext::default())
            .await;
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_multiple_calls_pair_per_call() {
        // Two tool calls in one iteration: the assistant message is
        // appended once per call, content duplicated.
        let provider = MockProvider::new(vec![
            MockStream::Chunks(vec![
                StreamChunk::content("working"),
                tool_fragment(0, Some("c1"), Some("alpha"), "{}"),
                tool_fragment(1, Some("c2"), Some("beta"), "{}"),
            ]),
            MockStream::Chunks(vec![StreamChunk::content("done")]),
        ]);

        let registry = ToolRegistry::new();
        registry.register(MockTool::new("alpha").returning("a"));
        registry.register(MockTool::new("beta").returning("b"));

        let react = loop_with(provider, registry, ReactConfig::default());
        let outcome = react
            .run(vec![ChatMessage::user("go")], None, &NoopHooks, &ToolContext::default())
            .await
            .unwrap();

        // 1 + 2 * total_tool_calls
        assert_eq!(outcome.tool_calls_total, 2);
        assert_eq!(outcome.messages.len(), 1 + 2 * 2);

        assert_eq!(outcome.messages[0].tool_calls.as_ref().unwrap()[0].id, "c1");
        assert_eq!(outcome.messages[0].content, "working");
        assert_eq!(outcome.messages[1].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(outcome.messages[2].tool_calls.as_ref().unwrap()[0].id, "c2");
        assert_eq!(outcome.messages[2].content, "working");
        assert_eq!(outcome.messages[3].tool_call_id.as_deref(), Some("c2"));

        // Every tool message matches an id carried by the assistant
        // message right before it.
        for pair in outcome.messages.chunks(2).take(2) {
            let carried = &pair[0].tool_calls.as_ref().unwrap()[0].id;
            assert_eq!(pair[1].tool_call_id.as_deref(), Some(carried.as_str()));
        }
    }

    #[tokio::test]
    async fn test_single_assistant_message_mode() {
        let provider = MockProvider::new(vec![
            MockStream::Chunks(vec![
                tool_fragment(0, Some("c1"), Some("alpha"), "{}"),
                tool_fragment(1, Some("c2"), Some("beta"), "{}"),
            ]),
            MockStream::Chunks(vec![StreamChunk::content("done")]),
        ]);

        let registry = ToolRegistry::new();
        registry.register(MockTool::new("alpha"));
        registry.register(MockTool::new("beta"));

        let react = loop_with(
            provider,
            registry,
            ReactConfig {
                pair_tool_messages: false,
                ..Default::default()
            },
        );
        let outcome = react
            .run(vec![ChatMessage::user("go")], None, &NoopHooks, &ToolContext::default())
            .await
            .unwrap();

        // One assistant with both calls, two tool messages, final assistant.
        assert_eq!(outcome.messages.len(), 4);
        assert_eq!(outcome.messages[0].tool_calls.as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_reassembly_is_loss_free() {
        // Property 3: content is the concatenation of all deltas.
        let provider = MockProvider::new(vec![MockStream::Chunks(vec![
            StreamChunk::content("a"),
            StreamChunk::content("b"),
            StreamChunk::content("c"),
        ])]);
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());
        let outcome = react
            .run(vec![ChatMessage::user("x")], None, &NoopHooks, &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.content, "abc");
    }

    #[tokio::test]
    async fn test_request_veto_aborts_turn() {
        struct Veto;
        impl AgentHooks for Veto {
            fn on_llm_request(&self, _request: &ChatRequest, _iteration: u32) -> HookResult {
                Err(crate::error::HookError::new("policy says no"))
            }
        }

        let provider = MockProvider::with_text("never sent");
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());
        let err = react
            .run(vec![ChatMessage::user("x")], None, &Veto, &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::HookVeto(_)));
    }

    #[tokio::test]
    async fn test_other_hook_errors_ignored() {
        struct Flaky;
        impl AgentHooks for Flaky {
            fn on_llm_chunk(&self, _content: &str, _reasoning: &str) -> HookResult {
                Err(crate::error::HookError::new("chunk hook down"))
            }
            fn on_complete(&self, _c: &str, _r: &str, _i: u32) -> HookResult {
                Err(crate::error::HookError::new("complete hook down"))
            }
        }

        let provider = MockProvider::with_text("fine");
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());
        let outcome = react
            .run(vec![ChatMessage::user("x")], None, &Flaky, &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.content, "fine");
    }

    #[tokio::test]
    async fn test_chunk_hook_sees_deltas_and_reasoning_buffer() {
        struct Capture {
            events: Mutex<Vec<(String, String)>>,
        }
        impl AgentHooks for Capture {
            fn on_llm_chunk(&self, content_delta: &str, reasoning_buf: &str) -> HookResult {
                self.events
                    .lock()
                    .unwrap()
                    .push((content_delta.to_string(), reasoning_buf.to_string()));
                Ok(())
            }
        }

        let provider = MockProvider::new(vec![MockStream::Chunks(vec![
            StreamChunk::reasoning("deep "),
            StreamChunk::reasoning("thought"),
            StreamChunk::content("answer"),
        ])]);
        let hooks = Capture {
            events: Mutex::new(Vec::new()),
        };
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());
        react
            .run(vec![ChatMessage::user("x")], None, &hooks, &ToolContext::default())
            .await
            .unwrap();

        let events = hooks.events.lock().unwrap();
        assert_eq!(events[0], ("".to_string(), "deep ".to_string()));
        assert_eq!(events[1], ("".to_string(), "deep thought".to_string()));
        assert_eq!(events[2], ("answer".to_string(), "deep thought".to_string()));
    }

    #[tokio::test]
    async fn test_provider_error_fails_turn() {
        let provider = MockProvider::new(vec![MockStream::Error("upstream 502".to_string())]);
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());
        let err = react
            .run(vec![ChatMessage::user("x")], None, &NoopHooks, &ToolContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let provider = MockProvider::with_text("unused");
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());

        let ctx = ToolContext::default();
        ctx.cancellation.cancel();

        let err = react
            .run(vec![ChatMessage::user("x")], None, &NoopHooks, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }

    #[tokio::test]
    async fn test_unknown_tool_keeps_looping() {
        // The model calls a tool that is not registered; the error text
        // reaches the transcript and the next iteration still runs.
        let provider = MockProvider::new(vec![
            MockStream::Chunks(vec![tool_fragment(0, Some("c1"), Some("ghost"), "{}")]),
            MockStream::Chunks(vec![StreamChunk::content("recovered")]),
        ]);
        let react = loop_with(provider, ToolRegistry::new(), ReactConfig::default());
        let outcome = react
            .run(vec![ChatMessage::user("x")], None, &NoopHooks, &ToolContext::default())
            .await
            .unwrap();

        assert_eq!(outcome.content, "recovered");
        assert!(outcome.messages[1].content.contains("tool not found"));
    }
}
