//! WebSocket hub.
//!
//! One hub owns the connected-client set. Per client: a bounded send
//! queue drained by a writer task (54 s ping cadence, 10 s write
//! deadline) and a reader task feeding inbound messages to the bus tagged
//! with a generated `client_id`. A client whose queue fills up is
//! evicted. The outbound dispatcher consumes the bus's global queue:
//! events carrying `client_id` go to that client only, the rest broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use magpie_types::{InboundMessage, OutboundKind, OutboundMessage, meta_keys};

use crate::state::AppState;

/// Channel name for WebSocket-originated messages.
const WS_CHANNEL: &str = "websocket";

/// Ping cadence on the writer task.
const PING_INTERVAL: Duration = Duration::from_secs(54);

/// Per-write deadline; a stalled socket is dropped.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// How long the reader waits for any frame (pongs included) before
/// declaring the client gone. Pings go out every 54 s, so a healthy
/// connection always produces traffic inside this window.
const PONG_WAIT: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// Protocol Types
// ─────────────────────────────────────────────────────────────────────────────

/// Frame from client to server.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
    /// Opaque extension payload, passed through untouched.
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Frame from server to client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&OutboundMessage> for ServerFrame {
    fn from(msg: &OutboundMessage) -> Self {
        Self {
            kind: msg.kind,
            content: msg.content.clone(),
            thinking: msg.thinking.clone(),
            chat_id: Some(msg.chat_id.clone()),
            tool_name: msg.tool_name.clone(),
            error: msg.error.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hub
// ─────────────────────────────────────────────────────────────────────────────

/// The connected-client set with per-client bounded send queues.
pub struct WsHub {
    clients: RwLock<HashMap<String, mpsc::Sender<ServerFrame>>>,
    send_queue: usize,
}

impl WsHub {
    pub fn new(send_queue: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            send_queue: send_queue.max(1),
        }
    }

    /// Register a client and return the receiving end of its send queue.
    pub fn register(&self, client_id: impl Into<String>) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(self.send_queue);
        self.clients.write().insert(client_id.into(), tx);
        rx
    }

    /// Remove a client. Returns whether it was registered.
    pub fn unregister(&self, client_id: &str) -> bool {
        self.clients.write().remove(client_id).is_some()
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Deliver a frame to one client. A full or closed queue evicts the
    /// client; returns whether the frame was queued.
    pub fn send_to(&self, client_id: &str, frame: ServerFrame) -> bool {
        let sent = {
            let clients = self.clients.read();
            match clients.get(client_id) {
                Some(tx) => tx.try_send(frame).is_ok(),
                None => return false,
            }
        };

        if !sent {
            tracing::warn!(client_id, "Send queue full, evicting client");
            self.unregister(client_id);
        }
        sent
    }

    /// Deliver a frame to every client, evicting any with a full queue.
    pub fn broadcast(&self, frame: ServerFrame) {
        let mut evict: Vec<String> = Vec::new();
        {
            let clients = self.clients.read();
            for (client_id, tx) in clients.iter() {
                if tx.try_send(frame.clone()).is_err() {
                    evict.push(client_id.clone());
                }
            }
        }
        for client_id in evict {
            tracing::warn!(client_id = %client_id, "Send queue full, evicting client");
            self.unregister(&client_id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Pump the bus's global outbound queue into the hub.
///
/// Events with `metadata.client_id` go to that client only; the rest
/// broadcast to every connected client.
pub async fn run_dispatcher(
    hub: Arc<WsHub>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => return,
            },
        };

        if msg.channel != WS_CHANNEL {
            continue;
        }

        let frame = ServerFrame::from(&msg);
        match msg.client_id() {
            Some(client_id) => {
                hub.send_to(client_id, frame);
            }
            None => hub.broadcast(frame),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection handling
// ─────────────────────────────────────────────────────────────────────────────

/// GET /ws: the WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4().to_string();
    let queue = state.ws_hub.register(&client_id);

    tracing::debug!(client_id = %client_id, "WebSocket client connected");

    let (sender, mut receiver) = socket.split();
    let writer_done = CancellationToken::new();
    let writer = tokio::spawn(run_writer(sender, queue, writer_done.clone()));

    // Reader loop: every well-formed chat frame becomes an inbound
    // message tagged with this connection's client id.
    loop {
        let frame = tokio::select! {
            _ = writer_done.cancelled() => break,
            _ = state.cancel.cancelled() => break,
            frame = tokio::time::timeout(PONG_WAIT, receiver.next()) => match frame {
                Ok(frame) => frame,
                Err(_) => {
                    tracing::debug!(client_id = %client_id, "Pong wait expired, dropping client");
                    break;
                }
            },
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!(client_id = %client_id, error = %e, "WebSocket read error");
                break;
            }
        };

        let parsed: ClientFrame = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "Ignoring malformed frame");
                continue;
            }
        };

        match parsed.kind.as_str() {
            "chat" | "message" => {
                if parsed.content.trim().is_empty() {
                    continue;
                }
                let chat_id = parsed.chat_id.unwrap_or_else(|| client_id.clone());
                let user_id = parsed.user_id.unwrap_or_else(|| "anonymous".to_string());
                let inbound = InboundMessage::new(WS_CHANNEL, chat_id, user_id, parsed.content)
                    .with_meta(meta_keys::CLIENT_ID, client_id.clone());
                let _ = state.bus.publish_inbound(inbound);
            }
            other => {
                tracing::trace!(client_id = %client_id, kind = %other, "Ignoring frame type");
            }
        }
    }

    state.ws_hub.unregister(&client_id);
    writer_done.cancel();
    let _ = writer.await;
    tracing::debug!(client_id = %client_id, "WebSocket client disconnected");
}

/// Drain the send queue into the socket with a ping heartbeat.
async fn run_writer(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<ServerFrame>,
    done: CancellationToken,
) {
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // first tick completes immediately

    loop {
        let message = tokio::select! {
            _ = done.cancelled() => break,
            _ = ping.tick() => Message::Ping(Vec::new().into()),
            frame = queue.recv() => match frame {
                Some(frame) => match serde_json::to_string(&frame) {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping unencodable frame");
                        continue;
                    }
                },
                // Queue closed: the hub evicted this client.
                None => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
        };

        match tokio::time::timeout(WRITE_DEADLINE, sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "WebSocket write failed");
                break;
            }
            Err(_) => {
                tracing::warn!("WebSocket write deadline exceeded, dropping client");
                break;
            }
        }
    }

    done.cancel();
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
