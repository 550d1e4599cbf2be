//! Field-level merge of partial records into the in-memory session.
//!
//! [`apply_patch`] is the single merge rule shared by local hydration, remote
//! loads, and document import: every field present in the patch overwrites the
//! session's field, absent fields are left untouched. Message timestamps are
//! parsed before anything is written, so a malformed record changes nothing.

use thiserror::Error;

use super::types::{ChatMessage, SessionPatch, SessionState, StoredMessage};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("malformed message list: {0}")]
    MalformedMessages(String),
}

/// Which fields an [`apply_patch`] call actually changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub agent_name: bool,
    pub persona: bool,
    pub knowledge_base: bool,
    pub messages: bool,
    pub theme: bool,
    pub mode: bool,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.agent_name
            || self.persona
            || self.knowledge_base
            || self.messages
            || self.theme
            || self.mode
    }
}

/// Rehydrate a stored message list, failing on the first bad entry.
pub fn hydrate_messages(stored: Vec<StoredMessage>) -> Result<Vec<ChatMessage>, MergeError> {
    stored
        .into_iter()
        .map(StoredMessage::hydrate)
        .collect::<Result<Vec<_>, _>>()
        .map_err(MergeError::MalformedMessages)
}

/// Merge `patch` into `state`. Applying the same patch twice is a no-op the second time.
pub fn apply_patch(state: &mut SessionState, patch: SessionPatch) -> Result<MergeOutcome, MergeError> {
    let messages = patch.messages.map(hydrate_messages).transpose()?;
    let mut outcome = MergeOutcome::default();

    if let Some(name) = patch.app_name {
        outcome.agent_name = state.agent_name != name;
        state.agent_name = name;
    }
    if let Some(persona) = patch.persona {
        outcome.persona = state.persona_text != persona;
        state.persona_text = persona;
    }
    if let Some(kb) = patch.syllabus_data {
        outcome.knowledge_base = state.knowledge_base != kb;
        state.knowledge_base = kb;
    }
    if let Some(messages) = messages {
        outcome.messages = state.messages != messages;
        state.messages = messages;
    }
    if let Some(theme) = patch.theme {
        outcome.theme = state.theme != theme;
        state.theme = theme;
    }
    if let Some(mode) = patch.mode {
        outcome.mode = state.mode != mode;
        state.mode = mode;
    }
    if let Some(ts) = patch.last_updated {
        state.last_updated = Some(state.last_updated.map_or(ts, |cur| cur.max(ts)));
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::{Role, StoredTimestamp, Theme, ThemeMode};

    #[test]
    fn absent_fields_are_untouched() {
        let mut state = SessionState::default();
        state.mode = ThemeMode::Light;
        let before_name = state.agent_name.clone();

        let patch = SessionPatch {
            theme: Some(Theme::Sunday),
            ..Default::default()
        };
        let outcome = apply_patch(&mut state, patch).unwrap();

        assert!(outcome.theme);
        assert!(!outcome.mode);
        assert_eq!(state.theme, Theme::Sunday);
        assert_eq!(state.mode, ThemeMode::Light);
        assert_eq!(state.agent_name, before_name);
    }

    #[test]
    fn bad_message_leaves_state_unchanged() {
        let mut state = SessionState::default();
        let before = state.clone();
        let patch = SessionPatch {
            app_name: Some("Other".into()),
            messages: Some(vec![StoredMessage {
                id: "m1".into(),
                role: Role::User,
                text: "hi".into(),
                timestamp: StoredTimestamp::Text("not a date".into()),
                attachments: None,
                is_streaming: None,
                translation: None,
            }]),
            ..Default::default()
        };

        assert!(apply_patch(&mut state, patch).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn stale_streaming_flag_is_dropped_on_hydration() {
        let stored = vec![StoredMessage {
            id: "m1".into(),
            role: Role::Model,
            text: "half an ans".into(),
            timestamp: StoredTimestamp::Millis(1_700_000_000_000),
            attachments: None,
            is_streaming: Some(true),
            translation: None,
        }];
        let messages = hydrate_messages(stored).unwrap();
        assert!(!messages[0].is_streaming);
    }

    #[test]
    fn last_updated_only_moves_forward() {
        let mut state = SessionState::default();
        state.last_updated = Some(500);
        let patch = SessionPatch {
            last_updated: Some(200),
            ..Default::default()
        };
        apply_patch(&mut state, patch).unwrap();
        assert_eq!(state.last_updated, Some(500));
    }
}
