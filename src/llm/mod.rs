//! Language model seam.
//!
//! [`ChatModel`] is what the chat flow and the HTTP API talk to;
//! [`gemini::GeminiClient`] is the production implementation.

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::knowledge::{GeneratedKnowledge, SourceAnalysis};
use crate::session::types::{Attachment, ChatMessage, KnowledgeBase};
use crate::store::local::{LocalStore, USER_API_KEY};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Gemini API key not configured. Please add one in the Agent Console > Connections tab.")]
    NotConfigured,

    #[error("invalid API key format")]
    InvalidKey,

    #[error("network error: {0}")]
    Transport(String),

    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("unreadable model response: {0}")]
    Parse(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-request switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatOptions {
    /// Use the reasoning model with a thinking budget.
    pub use_thinking: bool,
    /// Enable the search tool.
    pub use_search: bool,
    /// Site or topic the search tool should favour.
    pub search_focus: Option<String>,
}

/// Everything needed to produce one model reply.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Prior turns, oldest first. Trimmed to the history limit when sent.
    pub history: Vec<ChatMessage>,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub options: ChatOptions,
    pub persona: String,
    pub knowledge_base: KnowledgeBase,
}

/// One candidate persona offered to the user.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaVariation {
    pub title: String,
    pub tone: String,
    pub content: String,
}

/// Name, persona and knowledge base generated together from one description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfiguration {
    pub app_name: String,
    pub persona: String,
    pub knowledge_base: GeneratedKnowledge,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Stream a reply. `on_text` receives the cumulative text after every chunk.
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, LlmError>;

    /// English to Bengali or Bengali to English.
    async fn translate(&self, text: &str) -> Result<String, LlmError>;

    /// Extract knowledge base metadata from a document.
    async fn analyze_source(&self, content: &str) -> Result<SourceAnalysis, LlmError>;

    /// Three persona styles for a short description: balanced, academic, socratic.
    async fn persona_variations(&self, description: &str) -> Result<Vec<PersonaVariation>, LlmError>;

    /// A single persona text for a short description.
    async fn draft_persona(&self, description: &str) -> Result<String, LlmError>;

    /// Sources, scholars, terms and starters a persona would draw on.
    async fn knowledge_from_persona(&self, persona: &str) -> Result<GeneratedKnowledge, LlmError>;

    async fn configure_agent(&self, description: &str) -> Result<AgentConfiguration, LlmError>;
}

/// The last `limit` turns.
pub fn recent_history(history: &[ChatMessage], limit: usize) -> &[ChatMessage] {
    &history[history.len().saturating_sub(limit)..]
}

/// Persona, optional search focus, then the body of every primary source that has one.
pub fn effective_system_instruction(persona: &str, kb: &KnowledgeBase, search_focus: Option<&str>) -> String {
    let mut context = String::new();
    for source in &kb.primary_sources_en {
        if let Some(content) = source.content.as_deref().filter(|c| !c.is_empty()) {
            context.push_str(&format!("\n\n--- SOURCE: {} ---\n{}\n", source.text, content));
        }
    }

    let mut instruction = String::from(persona);
    if let Some(focus) = search_focus.map(str::trim).filter(|f| !f.is_empty()) {
        instruction.push_str(&format!(
            "\n\nIMPORTANT SEARCH INSTRUCTION: The user has requested to restrict or focus Google Searches on: \"{focus}\". \
             Please try to use \"site:{focus}\" or similar constraints in your search tool calls if appropriate."
        ));
    }
    if !context.is_empty() {
        instruction.push_str("\n\n### REFERENCE KNOWLEDGE BASE:\n");
        instruction.push_str(&context);
    }
    instruction
}

pub fn translation_prompt(text: &str) -> String {
    format!(
        "Translate the following text. If it is in English, translate to Bengali. \
         If it is in Bengali, translate to English. Maintain professional/scholarly tone.\n\nTEXT:\n{text}"
    )
}

/// At least 30 characters from `[A-Za-z0-9_-]`.
pub fn is_valid_api_key(key: &str) -> bool {
    key.len() >= 30
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUpdate {
    Saved,
    Cleared,
}

/// Save a user-supplied API key. Empty input removes it so the configured key applies again.
pub fn set_user_api_key(local: &LocalStore, key: &str) -> Result<KeyUpdate, LlmError> {
    let key = key.trim();
    if key.is_empty() {
        local.remove(USER_API_KEY)?;
        tracing::info!("user api key cleared");
        return Ok(KeyUpdate::Cleared);
    }
    if !is_valid_api_key(key) {
        return Err(LlmError::InvalidKey);
    }
    local.set(USER_API_KEY, key)?;
    tracing::info!("user api key saved");
    Ok(KeyUpdate::Saved)
}

/// The user key when present, else the configured one.
pub fn resolve_api_key(local: &LocalStore, configured: &str) -> Result<String, LlmError> {
    if let Some(key) = local.user_api_key()? {
        return Ok(key);
    }
    if configured.is_empty() {
        Err(LlmError::NotConfigured)
    } else {
        Ok(configured.to_string())
    }
}
