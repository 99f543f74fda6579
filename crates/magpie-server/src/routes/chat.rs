//! Chat endpoints: synchronous request/response and SSE streaming.
//!
//! Both go through the bus rather than calling the agent directly: the
//! handler publishes a synthetic inbound tagged with a fresh `stream_id`,
//! subscribes under `rest_<stream_id>`, and relays the correlated events
//! back to the HTTP client.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use magpie_bus::MessageBus;
use magpie_types::{InboundMessage, OutboundKind, meta_keys};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Channel name for HTTP-originated messages.
const REST_CHANNEL: &str = "rest";

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for both chat endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatApiRequest {
    pub content: String,
    #[serde(default = "default_chat_id")]
    pub chat_id: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_chat_id() -> String {
    "default".to_string()
}

fn default_user_id() -> String {
    "anonymous".to_string()
}

/// Response from the synchronous chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub response: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription guard
// ─────────────────────────────────────────────────────────────────────────────

/// Unsubscribes when dropped, so a disconnecting client releases its
/// queue even if the turn is still running.
struct SubscriptionGuard {
    bus: Arc<MessageBus>,
    name: String,
}

impl SubscriptionGuard {
    fn new(bus: Arc<MessageBus>, name: String) -> Self {
        Self { bus, name }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.bus.unsubscribe_outbound(&self.name);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/chat: wait for the full turn and return the final text.
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatApiRequest>,
) -> Result<Json<ChatApiResponse>> {
    if request.content.trim().is_empty() {
        return Err(ServerError::BadRequest("content must not be empty".to_string()));
    }

    let stream_id = Uuid::new_v4().to_string();
    let subscription = format!("rest_{}", stream_id);
    let mut rx = state.bus.subscribe_outbound(&subscription);
    let _guard = SubscriptionGuard::new(state.bus.clone(), subscription);

    let inbound = InboundMessage::new(REST_CHANNEL, &request.chat_id, &request.user_id, &request.content)
        .with_meta(meta_keys::STREAM_ID, stream_id.clone());
    state
        .bus
        .publish_inbound(inbound)
        .map_err(|e| ServerError::Internal(format!("failed to enqueue message: {}", e)))?;

    let mut response = String::new();
    loop {
        let event = tokio::time::timeout(state.settings.chat_timeout, rx.recv())
            .await
            .map_err(|_| ServerError::Timeout)?
            .ok_or_else(|| ServerError::Internal("subscription closed".to_string()))?;

        // Every named subscriber sees the full outbound fan-out; this
        // request only cares about its own turn.
        if event.stream_id() != Some(stream_id.as_str()) {
            continue;
        }

        match event.kind {
            OutboundKind::Chunk => {
                if let Some(content) = event.content {
                    response.push_str(&content);
                }
            }
            OutboundKind::Error => {
                return Err(ServerError::Internal(
                    event.error.unwrap_or_else(|| "turn failed".to_string()),
                ));
            }
            OutboundKind::End => break,
            _ => {}
        }
    }

    Ok(Json(ChatApiResponse { response }))
}

/// POST /api/v1/chat/stream: relay the turn as an SSE stream.
///
/// Each chunk is written as `data: <content>`; the stream closes with
/// `data: [DONE]`, on client disconnect, or after the idle timeout.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatApiRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    if request.content.trim().is_empty() {
        return Err(ServerError::BadRequest("content must not be empty".to_string()));
    }

    let stream_id = Uuid::new_v4().to_string();
    let subscription = format!("rest_{}", stream_id);
    let rx = state.bus.subscribe_outbound(&subscription);
    let guard = SubscriptionGuard::new(state.bus.clone(), subscription);

    let inbound = InboundMessage::new(REST_CHANNEL, &request.chat_id, &request.user_id, &request.content)
        .with_meta(meta_keys::REST_STREAM, true)
        .with_meta(meta_keys::STREAM_ID, stream_id.clone());
    state
        .bus
        .publish_inbound(inbound)
        .map_err(|e| ServerError::Internal(format!("failed to enqueue message: {}", e)))?;

    let idle_timeout = state.settings.sse_idle_timeout;
    let sse_stream = async_stream::stream! {
        // Held for the stream's lifetime; dropping it (client disconnect
        // included) releases the subscription.
        let _guard = guard;
        let mut rx = rx;

        loop {
            let next = tokio::time::timeout(idle_timeout, rx.recv()).await;
            let event = match next {
                Err(_) => {
                    tracing::debug!(stream_id = %stream_id, "SSE stream idle timeout");
                    break;
                }
                Ok(None) => break,
                Ok(Some(event)) => event,
            };

            if event.stream_id() != Some(stream_id.as_str()) {
                continue;
            }

            match event.kind {
                OutboundKind::Chunk => {
                    yield Ok(Event::default().data(event.content.unwrap_or_default()));
                }
                OutboundKind::Error => {
                    yield Ok(Event::default()
                        .data(event.error.unwrap_or_else(|| "turn failed".to_string())));
                }
                OutboundKind::End => {
                    yield Ok(Event::default().data("[DONE]"));
                    break;
                }
                _ => {}
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerSettings;
    use crate::worker;
    use magpie_agent::ToolRegistry;
    use magpie_memory::{Consolidator, ConsolidatorConfig};
    use magpie_provider::MockProvider;
    use magpie_storage::SqliteStorage;
    use std::time::Duration;

    fn test_state(provider: MockProvider) -> AppState {
        let settings = ServerSettings {
            chat_timeout: Duration::from_secs(2),
            sse_idle_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        AppState::new(
            Arc::new(MessageBus::new()),
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(provider),
            Arc::new(ToolRegistry::new()),
            Arc::new(Consolidator::new(ConsolidatorConfig::default())),
            settings,
        )
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let state = test_state(MockProvider::with_text("Hello there"));
        tokio::spawn(worker::run_worker(state.clone()));

        let response = chat_handler(
            State(state),
            Json(ChatApiRequest {
                content: "hi".to_string(),
                chat_id: "c1".to_string(),
                user_id: "u1".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.response, "Hello there");
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_content() {
        let state = test_state(MockProvider::with_text("unused"));
        let err = chat_handler(
            State(state),
            Json(ChatApiRequest {
                content: "   ".to_string(),
                chat_id: "c1".to_string(),
                user_id: "u1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_chat_times_out_without_worker() {
        // No worker consuming the bus: the handler must give up.
        let state = test_state(MockProvider::with_text("unused"));
        let err = chat_handler(
            State(state),
            Json(ChatApiRequest {
                content: "hi".to_string(),
                chat_id: "c1".to_string(),
                user_id: "u1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::Timeout));
    }

    #[tokio::test]
    async fn test_chat_request_defaults() {
        let request: ChatApiRequest = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        assert_eq!(request.chat_id, "default");
        assert_eq!(request.user_id, "anonymous");
    }

    #[tokio::test]
    async fn test_subscription_released_after_chat() {
        let state = test_state(MockProvider::with_text("done"));
        tokio::spawn(worker::run_worker(state.clone()));

        chat_handler(
            State(state.clone()),
            Json(ChatApiRequest {
                content: "hi".to_string(),
                chat_id: "c1".to_string(),
                user_id: "u1".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(state.bus.subscriber_count(), 0);
    }
}
