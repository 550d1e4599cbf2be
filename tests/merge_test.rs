use chrono::{TimeZone, Utc};
use samsaya::session::merge::apply_patch;
use samsaya::session::types::{
    Attachment, ChatMessage, Role, SessionPatch, SessionState, StoredSession, Theme, ThemeMode,
};

fn message_at(role: Role, text: &str, ms: i64) -> ChatMessage {
    let mut msg = ChatMessage::new(role, text);
    msg.timestamp = Utc.timestamp_millis_opt(ms).unwrap();
    msg
}

fn patch_from_json(json: &str) -> SessionPatch {
    serde_json::from_str(json).unwrap()
}

#[test]
fn merging_the_same_record_twice_is_idempotent() {
    let patch = patch_from_json(
        r#"{
            "appName": "Mangrove Scholar",
            "theme": "tuesday",
            "messages": [{"id": "m1", "role": "user", "text": "hello", "timestamp": 1700000000000}],
            "lastUpdated": 1700000000500
        }"#,
    );

    let mut state = SessionState::default();
    let first = apply_patch(&mut state, patch.clone()).unwrap();
    let after_first = state.clone();
    let second = apply_patch(&mut state, patch).unwrap();

    assert!(first.changed());
    assert!(!second.changed());
    assert_eq!(state, after_first);
}

#[test]
fn partial_record_only_touches_present_fields() {
    let mut state = SessionState::default();
    state.agent_name = "Keeper".into();
    state.theme = Theme::Monday;
    state.messages = vec![message_at(Role::User, "kept", 1_700_000_000_000)];
    let kb_before = state.knowledge_base.clone();

    let outcome = apply_patch(&mut state, patch_from_json(r#"{"theme": "saturday"}"#)).unwrap();

    assert!(outcome.theme);
    assert_eq!(state.theme, Theme::Saturday);
    assert_eq!(state.agent_name, "Keeper");
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.knowledge_base, kb_before);
}

#[test]
fn null_and_empty_fields_never_clobber() {
    let mut state = SessionState::default();
    state.agent_name = "Keeper".into();

    let patch = patch_from_json(r#"{"appName": "", "persona": null, "syllabusData": null, "mode": "light"}"#);
    apply_patch(&mut state, patch).unwrap();

    assert_eq!(state.agent_name, "Keeper");
    assert_eq!(state.mode, ThemeMode::Light);
}

#[test]
fn empty_message_list_is_applied() {
    let mut state = SessionState::default();
    state.messages = vec![message_at(Role::User, "old", 1_700_000_000_000)];

    let outcome = apply_patch(&mut state, patch_from_json(r#"{"messages": []}"#)).unwrap();
    assert!(outcome.messages);
    assert!(state.messages.is_empty());
}

#[test]
fn iso_timestamps_hydrate() {
    let mut state = SessionState::default();
    let patch = patch_from_json(
        r#"{"messages": [
            {"id": "a", "role": "user", "text": "q", "timestamp": "2024-05-01T10:00:00.000Z"},
            {"id": "b", "role": "model", "text": "r", "timestamp": 1714557601000.0}
        ]}"#,
    );
    apply_patch(&mut state, patch).unwrap();

    assert_eq!(state.messages[0].timestamp.timestamp_millis(), 1_714_557_600_000);
    assert_eq!(state.messages[1].timestamp.timestamp_millis(), 1_714_557_601_000);
    assert_eq!(state.messages[1].role, Role::Model);
}

#[test]
fn stored_session_round_trips_with_attachment_and_bengali_term() {
    let mut state = SessionState::default();
    state.knowledge_base.key_terms.insert("বনবিবি".to_string());
    state.messages = vec![
        message_at(Role::User, "What is this leaf?", 1_700_000_000_000).with_attachments(vec![Attachment {
            mime_type: "image/jpeg".into(),
            data: "/9j/4AAQSkZJRg==".into(),
            name: Some("sundari-leaf.jpg".into()),
        }]),
        message_at(Role::Model, "A sundari leaf (Heritiera fomes).", 1_700_000_001_000),
    ];
    state.theme = Theme::Wednesday;
    state.mode = ThemeMode::Light;

    let stored = state.to_stored(1_700_000_002_000);
    let json = serde_json::to_string(&stored).unwrap();
    let parsed: StoredSession = serde_json::from_str(&json).unwrap();

    let mut restored = SessionState::default();
    apply_patch(&mut restored, SessionPatch::from(parsed)).unwrap();

    state.last_updated = Some(1_700_000_002_000);
    assert_eq!(restored, state);
    assert!(restored.knowledge_base.key_terms.contains("বনবিবি"));
}

#[test]
fn key_terms_deduplicate_on_merge() {
    let mut state = SessionState::default();
    let patch = patch_from_json(
        r#"{"syllabusData": {
            "project_title": "T", "core_concept": "C",
            "key_terms": ["Bonbibi", "Tiger", "Bonbibi"]
        }}"#,
    );
    apply_patch(&mut state, patch).unwrap();

    let terms: Vec<_> = state.knowledge_base.key_terms.iter().cloned().collect();
    assert_eq!(terms, vec!["Bonbibi".to_string(), "Tiger".to_string()]);
}
