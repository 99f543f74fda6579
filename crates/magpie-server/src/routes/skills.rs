//! Skill management endpoints.
//!
//! Skills are named prompt fragments; always-on skills are injected into
//! every turn's system prompt by the context builder.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use magpie_types::SkillRecord;

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Body for creating or updating a skill.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SkillBody {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub always_on: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// GET /api/v1/skills
pub async fn list_skills_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<SkillRecord>>> {
    Ok(Json(state.storage.list_skills()?))
}

/// POST /api/v1/skills
pub async fn create_skill_handler(
    State(state): State<AppState>,
    Json(body): Json<SkillBody>,
) -> Result<Json<SkillRecord>> {
    if body.name.trim().is_empty() {
        return Err(ServerError::BadRequest("skill name must not be empty".to_string()));
    }

    let mut skill = SkillRecord::new(body.name, body.prompt);
    skill.always_on = body.always_on;
    skill.enabled = body.enabled;
    let id = state.storage.create_skill(&skill)?;

    let created = state
        .storage
        .get_skill(id)?
        .ok_or_else(|| ServerError::Internal("skill vanished after insert".to_string()))?;
    Ok(Json(created))
}

/// GET /api/v1/skills/{id}
pub async fn get_skill_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SkillRecord>> {
    let skill = state
        .storage
        .get_skill(id)?
        .ok_or_else(|| ServerError::NotFound(format!("skill {}", id)))?;
    Ok(Json(skill))
}

/// PUT /api/v1/skills/{id}
pub async fn update_skill_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SkillBody>,
) -> Result<Json<SkillRecord>> {
    let mut skill = state
        .storage
        .get_skill(id)?
        .ok_or_else(|| ServerError::NotFound(format!("skill {}", id)))?;

    skill.name = body.name;
    skill.prompt = body.prompt;
    skill.always_on = body.always_on;
    skill.enabled = body.enabled;
    state.storage.update_skill(&skill)?;

    Ok(Json(skill))
}

/// DELETE /api/v1/skills/{id}
pub async fn delete_skill_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    if !state.storage.delete_skill(id)? {
        return Err(ServerError::NotFound(format!("skill {}", id)));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ServerSettings;
    use magpie_agent::ToolRegistry;
    use magpie_bus::MessageBus;
    use magpie_memory::{Consolidator, ConsolidatorConfig};
    use magpie_provider::MockProvider;
    use magpie_storage::SqliteStorage;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(
            Arc::new(MessageBus::new()),
            Arc::new(SqliteStorage::open_in_memory().unwrap()),
            Arc::new(MockProvider::with_text("hi")),
            Arc::new(ToolRegistry::new()),
            Arc::new(Consolidator::new(ConsolidatorConfig::default())),
            ServerSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_skill_lifecycle() {
        let state = test_state();

        let created = create_skill_handler(
            State(state.clone()),
            Json(SkillBody {
                name: "summarize".to_string(),
                prompt: "Summarize things.".to_string(),
                always_on: true,
                enabled: true,
            }),
        )
        .await
        .unwrap();
        let id = created.0.id;
        assert!(created.0.always_on);

        let fetched = get_skill_handler(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(fetched.0.name, "summarize");

        let updated = update_skill_handler(
            State(state.clone()),
            Path(id),
            Json(SkillBody {
                name: "summarize".to_string(),
                prompt: "Summarize briefly.".to_string(),
                always_on: false,
                enabled: true,
            }),
        )
        .await
        .unwrap();
        assert!(!updated.0.always_on);

        let listed = list_skills_handler(State(state.clone())).await.unwrap();
        assert_eq!(listed.0.len(), 1);

        delete_skill_handler(State(state.clone()), Path(id)).await.unwrap();
        let err = get_skill_handler(State(state), Path(id)).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let state = test_state();
        let err = create_skill_handler(
            State(state),
            Json(SkillBody {
                name: " ".to_string(),
                prompt: "p".to_string(),
                always_on: false,
                enabled: true,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServerError::BadRequest(_)));
    }
}
