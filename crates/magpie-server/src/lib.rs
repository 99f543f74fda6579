//! Channel adapters and the agent worker for Magpie.
//!
//! This crate is the network face of the runtime: the REST API (sync and
//! SSE chat, sessions, skills, providers), the WebSocket hub, and the
//! webhook endpoint, all decoupled from the agent through the message
//! bus. It also hosts the worker that consumes inbound messages and runs
//! turns.

pub mod error;
pub mod routes;
pub mod state;
pub mod worker;
pub mod ws;

pub use error::{Result, ServerError};
pub use state::{AppState, ServerSettings};
pub use worker::{PublishingHooks, StorageMemory, handle_inbound, run_worker};
pub use ws::{ClientFrame, ServerFrame, WsHub};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// The Magpie HTTP/WebSocket server.
pub struct Server {
    state: AppState,
    /// Mount path for the webhook endpoint, when enabled.
    webhook_path: Option<String>,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            webhook_path: None,
        }
    }

    /// Enable the webhook endpoint at the given path.
    pub fn with_webhook(mut self, path: impl Into<String>) -> Self {
        self.webhook_path = Some(path.into());
        self
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/ws", get(ws::ws_handler))
            .nest("/api/v1", Self::api_routes());

        if let Some(path) = &self.webhook_path {
            router = router.route(path, post(routes::webhook_handler));
        }

        router
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    fn api_routes() -> Router<AppState> {
        Router::new()
            .route("/health", get(routes::health_handler))
            .route("/chat", post(routes::chat_handler))
            .route("/chat/stream", post(routes::chat_stream_handler))
            .route(
                "/sessions",
                get(routes::list_sessions_handler).post(routes::create_session_handler),
            )
            .route(
                "/sessions/{id}",
                get(routes::get_session_handler).delete(routes::delete_session_handler),
            )
            .route(
                "/sessions/{id}/messages",
                get(routes::list_session_messages_handler),
            )
            .route("/providers", get(routes::providers_handler))
            .route(
                "/skills",
                get(routes::list_skills_handler).post(routes::create_skill_handler),
            )
            .route(
                "/skills/{id}",
                get(routes::get_skill_handler)
                    .put(routes::update_skill_handler)
                    .delete(routes::delete_skill_handler),
            )
    }

    /// Bind and serve until the state's cancellation token fires.
    ///
    /// Spawns the agent worker and the WebSocket outbound dispatcher
    /// alongside the HTTP listener.
    pub async fn run(self, bind: &str) -> std::io::Result<()> {
        let state = self.state.clone();

        tokio::spawn(worker::run_worker(state.clone()));

        if let Some(outbound) = state.bus.take_outbound() {
            tokio::spawn(ws::run_dispatcher(
                state.ws_hub.clone(),
                outbound,
                state.cancel.clone(),
            ));
        }

        let listener = TcpListener::bind(bind).await?;
        tracing::info!(bind, "Server listening");

        let cancel = state.cancel.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
