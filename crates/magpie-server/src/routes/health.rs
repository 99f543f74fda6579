//! Health check endpoint.

use axum::Json;

/// GET /api/v1/health
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
