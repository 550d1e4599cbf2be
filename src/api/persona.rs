use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::session::SessionView;
use super::{ApiError, ApiResult, AppState};
use crate::llm::PersonaVariation;
use crate::session::types::KnowledgeBase;
use crate::sync::configure;

#[derive(Debug, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub description: String,
}

impl Description {
    fn required(&self) -> Result<&str, ApiError> {
        let text = self.description.trim();
        if text.is_empty() {
            Err(ApiError::bad_request("description must not be empty"))
        } else {
            Ok(text)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PersonaDraft {
    pub persona: String,
}

pub async fn variations(
    State(state): State<AppState>,
    Json(body): Json<Description>,
) -> ApiResult<Vec<PersonaVariation>> {
    let variations = state.model.persona_variations(body.required()?).await?;
    Ok(Json(variations))
}

pub async fn draft(State(state): State<AppState>, Json(body): Json<Description>) -> ApiResult<PersonaDraft> {
    let persona = state.model.draft_persona(body.required()?).await?;
    Ok(Json(PersonaDraft { persona }))
}

pub async fn populate_knowledge(State(state): State<AppState>) -> ApiResult<KnowledgeBase> {
    let kb = configure::populate_knowledge(&state.coordinator, state.model.as_ref()).await?;
    Ok(Json(kb))
}

pub async fn auto_configure(State(state): State<AppState>, Json(body): Json<Description>) -> ApiResult<SessionView> {
    let session = configure::auto_configure(&state.coordinator, state.model.as_ref(), body.required()?).await?;
    Ok(Json(SessionView::new(state.coordinator.session_id(), session)))
}
