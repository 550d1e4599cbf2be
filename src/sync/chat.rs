//! Send-message flow: user turn, streaming model turn, error placeholder.

use serde::Serialize;

use super::coordinator::SessionCoordinator;
use crate::llm::{ChatModel, ChatOptions, ChatRequest, LlmError};
use crate::session::types::{Attachment, ChatMessage, Role, Translation};

/// Text left in the model turn when the request fails.
pub const CHAT_ERROR_TEXT: &str =
    "[System Error: Unable to query the repository. Verify API Key in Settings and connection.]";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOutcome {
    pub user_message_id: String,
    pub model_message_id: String,
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one exchange against `model`, recording both turns in the session.
///
/// Model failures do not surface as `Err`: the placeholder text is stored in
/// the model turn and the error is reported in [`ChatOutcome::error`].
pub async fn send_message(
    coordinator: &SessionCoordinator,
    model: &dyn ChatModel,
    text: &str,
    attachments: Vec<Attachment>,
    options: ChatOptions,
) -> ChatOutcome {
    send_message_observed(coordinator, model, text, attachments, options, &mut |_: &str| {}).await
}

/// [`send_message`], also handing each cumulative snapshot to `observe`.
pub async fn send_message_observed(
    coordinator: &SessionCoordinator,
    model: &dyn ChatModel,
    text: &str,
    attachments: Vec<Attachment>,
    options: ChatOptions,
    observe: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> ChatOutcome {
    let snapshot = coordinator.snapshot();
    let request = ChatRequest {
        history: snapshot.messages,
        text: text.to_string(),
        attachments: attachments.clone(),
        options,
        persona: snapshot.persona_text,
        knowledge_base: snapshot.knowledge_base,
    };

    let user_message_id =
        coordinator.push_message(ChatMessage::new(Role::User, text).with_attachments(attachments));
    let model_message_id = coordinator.push_message(ChatMessage::new(Role::Model, "").streaming());

    let mut on_text = |partial: &str| {
        coordinator.update_message_text(&model_message_id, partial);
        observe(partial);
    };
    let result = model.stream_chat(&request, &mut on_text).await;

    let outcome = match result {
        Ok(reply) => {
            coordinator.update_message_text(&model_message_id, &reply);
            ChatOutcome {
                user_message_id,
                model_message_id: model_message_id.clone(),
                reply,
                error: None,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "chat request failed");
            coordinator.update_message_text(&model_message_id, CHAT_ERROR_TEXT);
            ChatOutcome {
                user_message_id,
                model_message_id: model_message_id.clone(),
                reply: CHAT_ERROR_TEXT.to_string(),
                error: Some(e.to_string()),
            }
        }
    };

    coordinator.finish_message(&model_message_id);
    outcome
}

/// Show a message's translation, fetching it on first use.
///
/// A cached translation is toggled without calling the model. Returns
/// `Ok(None)` when no message has that id.
pub async fn translate_message(
    coordinator: &SessionCoordinator,
    model: &dyn ChatModel,
    id: &str,
) -> Result<Option<Translation>, LlmError> {
    let Some(message) = coordinator.message(id) else {
        return Ok(None);
    };
    if message.translation.is_some() {
        coordinator.toggle_translation(id);
        return Ok(coordinator.message(id).and_then(|m| m.translation));
    }

    let translated = model.translate(&message.text).await?;
    coordinator.set_translation(id, translated, "auto".to_string());
    Ok(coordinator.message(id).and_then(|m| m.translation))
}
