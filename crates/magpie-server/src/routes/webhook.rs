//! Webhook ingress endpoint.
//!
//! Accepts POSTed messages from external systems. When a shared secret is
//! configured, the request must carry `X-Webhook-Signature`: the hex
//! HMAC-SHA256 of the raw body. Bodies are JSON when they parse, raw text
//! otherwise.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use magpie_types::{InboundMessage, meta_keys};

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Signature header name.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

type HmacSha256 = Hmac<Sha256>;

/// JSON body accepted by the webhook.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct WebhookBody {
    content: String,
    chat_id: Option<String>,
    user_id: Option<String>,
    message_id: Option<String>,
    extra: Option<serde_json::Value>,
}

/// Response returned to the webhook caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub message_id: String,
}

/// POST {configured path}
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    if let Some(secret) = &state.settings.webhook_secret {
        verify_signature(secret, &headers, &body)?;
    }

    // JSON body when it parses, raw text fallback otherwise.
    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(_) => WebhookBody {
            content: String::from_utf8_lossy(&body).into_owned(),
            ..Default::default()
        },
    };

    if parsed.content.trim().is_empty() {
        return Err(ServerError::BadRequest("content must not be empty".to_string()));
    }

    let message_id = parsed
        .message_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let chat_id = parsed.chat_id.unwrap_or_else(|| "webhook".to_string());
    let user_id = parsed.user_id.unwrap_or_else(|| "webhook".to_string());

    let mut inbound = InboundMessage::new("webhook", chat_id, user_id, parsed.content)
        .with_meta(meta_keys::MESSAGE_ID, message_id.clone());
    if let Some(extra) = parsed.extra {
        inbound = inbound.with_meta("extra", extra);
    }

    state
        .bus
        .publish_inbound(inbound)
        .map_err(|e| ServerError::Internal(format!("failed to enqueue message: {}", e)))?;

    Ok(Json(WebhookResponse {
        success: true,
        message_id,
    }))
}

/// Check `X-Webhook-Signature` against the body. The Mac verify is
/// constant-time.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<()> {
    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::Unauthorized)?;

    let expected_bytes = hex::decode(provided).map_err(|_| ServerError::Unauthorized)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ServerError::Internal(format!("bad webhook secret: {}", e)))?;
    mac.update(body);
    mac.verify_slice(&expected_bytes)
        .map_err(|_| ServerError::Unauthorized)
}

/// Compute the hex signature for a body; used by tests and documented for
/// webhook callers.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
