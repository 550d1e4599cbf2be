use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::session::knowledge::SourceAnalysis;
use crate::session::types::{KnowledgeBase, SourcePrimary};

#[derive(Debug, Deserialize)]
pub struct AddSource {
    /// Shown when the analysis cannot name the document.
    #[serde(default = "default_title")]
    pub title: String,
    pub content: String,
    /// Metadata supplied by the caller. When absent the model analyses the document.
    #[serde(default)]
    pub analysis: Option<SourceAnalysis>,
}

fn default_title() -> String {
    "Pasted Content".to_string()
}

pub async fn add_source(State(state): State<AppState>, Json(body): Json<AddSource>) -> ApiResult<KnowledgeBase> {
    if body.content.trim().is_empty() {
        return Err(ApiError::bad_request("content must not be empty"));
    }

    let analysis = match body.analysis {
        Some(analysis) => analysis,
        None => match state.model.analyze_source(&body.content).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!(error = %e, "source analysis failed, using fallback");
                SourceAnalysis::fallback()
            }
        },
    };

    state
        .coordinator
        .add_knowledge_source(&body.title, &body.content, analysis);
    Ok(Json(state.coordinator.snapshot().knowledge_base))
}

pub async fn remove_source(State(state): State<AppState>, Path(index): Path<usize>) -> ApiResult<SourcePrimary> {
    state
        .coordinator
        .remove_knowledge_source(index)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no primary source at index {index}")))
}
