//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use magpie_agent::ToolRegistry;
use magpie_bus::MessageBus;
use magpie_memory::Consolidator;
use magpie_provider::SharedProvider;
use magpie_storage::Storage;

use crate::ws::WsHub;

/// Runtime settings the adapters and worker need.
///
/// The binary maps the config document onto this; tests construct it
/// directly.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Base system prompt for every turn.
    pub system_prompt: String,
    /// Model override; empty uses the provider default.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
    pub max_iterations: u32,
    /// Recent transcript messages included per turn.
    pub memory_window: usize,
    /// Webhook shared secret; unset disables signature checks.
    pub webhook_secret: Option<String>,
    /// Per-client WebSocket send queue capacity.
    pub ws_send_queue: usize,
    /// Timeout for blocking tool executions.
    pub exec_timeout: Duration,
    /// Idle timeout for SSE streaming requests.
    pub sse_idle_timeout: Duration,
    /// Deadline for the synchronous chat endpoint.
    pub chat_timeout: Duration,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful assistant.".to_string(),
            model: String::new(),
            temperature: None,
            max_tokens: 4096,
            max_iterations: 20,
            memory_window: 20,
            webhook_secret: None,
            ws_send_queue: 256,
            exec_timeout: Duration::from_secs(30),
            sse_idle_timeout: Duration::from_secs(60),
            chat_timeout: Duration::from_secs(120),
        }
    }
}

/// Application state shared by every route handler and the worker.
#[derive(Clone)]
pub struct AppState {
    pub bus: Arc<MessageBus>,
    pub storage: Arc<dyn Storage>,
    pub provider: SharedProvider,
    pub tools: Arc<ToolRegistry>,
    pub consolidator: Arc<Consolidator>,
    pub settings: Arc<ServerSettings>,
    pub ws_hub: Arc<WsHub>,
    /// Root cancellation token; cancelling it winds down every turn.
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(
        bus: Arc<MessageBus>,
        storage: Arc<dyn Storage>,
        provider: SharedProvider,
        tools: Arc<ToolRegistry>,
        consolidator: Arc<Consolidator>,
        settings: ServerSettings,
    ) -> Self {
        let ws_hub = Arc::new(WsHub::new(settings.ws_send_queue));
        Self {
            bus,
            storage,
            provider,
            tools,
            consolidator,
            settings: Arc::new(settings),
            ws_hub,
            cancel: CancellationToken::new(),
        }
    }
}
