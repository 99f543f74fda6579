//! Provider information endpoint.

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Response for GET /api/v1/providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersResponse {
    pub provider: String,
    pub default_model: String,
}

/// GET /api/v1/providers
pub async fn providers_handler(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        provider: state.provider.name().to_string(),
        default_model: state.provider.default_model().to_string(),
    })
}
