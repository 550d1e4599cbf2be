//! Model-assisted configuration: knowledge drawn from the persona, or a
//! whole agent generated from a short description.

use super::coordinator::SessionCoordinator;
use crate::llm::{ChatModel, LlmError};
use crate::session::types::{KnowledgeBase, SessionState};

/// Ask the model for the sources behind the current persona and append them.
/// On failure the session is left untouched.
pub async fn populate_knowledge(
    coordinator: &SessionCoordinator,
    model: &dyn ChatModel,
) -> Result<KnowledgeBase, LlmError> {
    let persona = coordinator.snapshot().persona_text;
    let generated = model.knowledge_from_persona(&persona).await?;
    tracing::debug!(sources = generated.primary_sources_en.len(), "generated knowledge base");
    coordinator.apply_generated_knowledge(generated);
    Ok(coordinator.snapshot().knowledge_base)
}

/// Generate name, persona and knowledge base from `description` and adopt them.
pub async fn auto_configure(
    coordinator: &SessionCoordinator,
    model: &dyn ChatModel,
    description: &str,
) -> Result<SessionState, LlmError> {
    let config = model.configure_agent(description).await?;
    coordinator.apply_agent_configuration(config);
    Ok(coordinator.snapshot())
}
