use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult, AppState};
use crate::session::merge::MergeOutcome;
use crate::session::types::{
    ExportDocument, KnowledgeBase, SessionState, StoredMessage, Theme, ThemeMode,
};

/// Session as returned to clients. Unlike the stored form, streaming turns are flagged.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: String,
    pub app_name: String,
    pub persona: String,
    pub syllabus_data: KnowledgeBase,
    pub messages: Vec<StoredMessage>,
    pub theme: Theme,
    pub mode: ThemeMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

impl SessionView {
    pub fn new(session_id: &str, state: SessionState) -> Self {
        let messages = state
            .messages
            .iter()
            .map(|m| StoredMessage {
                is_streaming: m.is_streaming.then_some(true),
                ..m.to_stored()
            })
            .collect();
        Self {
            session_id: session_id.to_string(),
            app_name: state.agent_name,
            persona: state.persona_text,
            syllabus_data: state.knowledge_base,
            messages,
            theme: state.theme,
            mode: state.mode,
            last_updated: state.last_updated,
        }
    }
}

/// Settings edit. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsPatch {
    pub app_name: Option<String>,
    pub persona: Option<String>,
    pub syllabus_data: Option<KnowledgeBase>,
    pub theme: Option<Theme>,
    pub mode: Option<ThemeMode>,
    /// Comma-separated chat starters.
    pub suggested_queries: Option<String>,
    /// Restore agent name, persona, and knowledge base defaults first.
    pub reset: bool,
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    let coord = &state.coordinator;
    Json(SessionView::new(coord.session_id(), coord.snapshot()))
}

pub async fn patch_session(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Json<SessionView> {
    let coord = &state.coordinator;
    if patch.reset {
        coord.reset_configuration();
    }
    if let Some(name) = patch.app_name {
        coord.update_agent_name(&name);
    }
    if let Some(persona) = patch.persona {
        coord.update_persona(&persona);
    }
    if let Some(kb) = patch.syllabus_data {
        coord.update_knowledge_base(kb);
    }
    if let Some(theme) = patch.theme {
        coord.update_theme(theme);
    }
    if let Some(mode) = patch.mode {
        coord.update_mode(mode);
    }
    if let Some(queries) = patch.suggested_queries {
        coord.set_suggested_queries(&queries);
    }
    Json(SessionView::new(coord.session_id(), coord.snapshot()))
}

pub async fn export(State(state): State<AppState>) -> Json<ExportDocument> {
    Json(state.coordinator.export_document())
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub changed: bool,
}

/// Accepts the document as the raw request body so malformed JSON gets the import error.
pub async fn import(State(state): State<AppState>, body: String) -> ApiResult<ImportResult> {
    let outcome: MergeOutcome = state
        .coordinator
        .import_document(&body)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(ImportResult {
        changed: outcome.changed(),
    }))
}
