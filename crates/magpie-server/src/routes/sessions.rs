//! Session management endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use magpie_types::{SessionRecord, StoredMessage};

use crate::error::{Result, ServerError};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

/// Session summary returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: i64,
    pub channel: String,
    pub chat_id: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SessionRecord> for SessionInfo {
    fn from(session: SessionRecord) -> Self {
        Self {
            id: session.id,
            channel: session.channel,
            chat_id: session.chat_id,
            user_id: session.user_id,
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

/// Body for POST /sessions.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub channel: Option<String>,
    pub chat_id: Option<String>,
    pub user_id: Option<String>,
}

/// Transcript message returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: i64,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub created_at: String,
}

impl From<StoredMessage> for MessageInfo {
    fn from(msg: StoredMessage) -> Self {
        Self {
            id: msg.id,
            role: msg.role.as_str().to_string(),
            content: msg.content,
            reasoning_content: msg.reasoning_content,
            tool_call_id: msg.tool_call_id,
            tool_name: msg.tool_name,
            created_at: msg.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/sessions
pub async fn list_sessions_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionInfo>>> {
    let sessions = state.storage.list_sessions()?;
    Ok(Json(sessions.into_iter().map(SessionInfo::from).collect()))
}

/// POST /api/v1/sessions
pub async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<SessionInfo>> {
    let channel = request.channel.unwrap_or_else(|| "rest".to_string());
    let chat_id = request
        .chat_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let user_id = request.user_id.unwrap_or_else(|| "anonymous".to_string());

    let session = state
        .storage
        .get_or_create_session(&channel, &chat_id, &user_id)?;
    Ok(Json(session.into()))
}

/// GET /api/v1/sessions/{id}
pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SessionInfo>> {
    let session = state
        .storage
        .get_session(id)?
        .ok_or_else(|| ServerError::NotFound(format!("session {}", id)))?;
    Ok(Json(session.into()))
}

/// DELETE /api/v1/sessions/{id}
pub async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    if !state.storage.delete_session(id)? {
        return Err(ServerError::NotFound(format!("session {}", id)));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/v1/sessions/{id}/messages
pub async fn list_session_messages_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageInfo>>> {
    if state.storage.get_session(id)?.is_none() {
        return Err(ServerError::NotFound(format!("session {}", id)));
    }
    let messages = state.storage.recent_messages(id, query.limit)?;
    Ok(Json(messages.into_iter().map(MessageInfo::from).collect()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
