use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::llm::ChatOptions;
use crate::session::types::{Attachment, Translation};
use crate::sync::chat::{self, ChatOutcome};
use crate::sync::coordinator::FlushReport;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub options: ChatOptions,
}

pub async fn send(State(state): State<AppState>, Json(body): Json<SendMessage>) -> ApiResult<ChatOutcome> {
    if body.text.trim().is_empty() && body.attachments.is_empty() {
        return Err(ApiError::bad_request("message text or an attachment is required"));
    }
    let outcome = chat::send_message(
        &state.coordinator,
        state.model.as_ref(),
        &body.text,
        body.attachments,
        body.options,
    )
    .await;
    Ok(Json(outcome))
}

pub async fn clear(State(state): State<AppState>) -> Json<FlushReport> {
    Json(state.coordinator.clear_history().await)
}

pub async fn new_chat(State(state): State<AppState>) -> Json<FlushReport> {
    Json(state.coordinator.start_new_chat().await)
}

pub async fn translate(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Translation> {
    chat::translate_message(&state.coordinator, state.model.as_ref(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no message with id {id}")))
}
