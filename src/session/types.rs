//! Session state type definitions.
//!
//! [`SessionState`] is the in-memory unit of persistence. [`StoredSession`] is its
//! wire/storage form (camelCase keys, epoch-millisecond timestamps, no streaming
//! flags) and [`SessionPatch`] is the partial variant every store load and every
//! imported document is parsed into.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Colour theme tag. Persisted, never interpreted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    #[default]
    Friday,
    Saturday,
    Sunday,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
            Self::Sunday => "sunday",
        }
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monday" => Ok(Self::Monday),
            "tuesday" => Ok(Self::Tuesday),
            "wednesday" => Ok(Self::Wednesday),
            "thursday" => Ok(Self::Thursday),
            "friday" => Ok(Self::Friday),
            "saturday" => Ok(Self::Saturday),
            "sunday" => Ok(Self::Sunday),
            _ => Err(format!("unknown theme: {s}")),
        }
    }
}

/// Light/dark display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl std::fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            _ => Err(format!("unknown mode: {s}")),
        }
    }
}

/// A primary knowledge source: a titled document, optionally with its full text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePrimary {
    /// Title of the source.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Short focus tag shown next to the title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concept_focus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Full body used as grounding context for the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A secondary (reference) source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceSecondary {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub works: Option<Vec<String>>,
    pub focus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// The structured document corpus that grounds model answers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub project_title: String,
    pub core_concept: String,
    #[serde(default)]
    pub primary_sources_en: Vec<SourcePrimary>,
    #[serde(default)]
    pub primary_sources_bn: Vec<SourcePrimary>,
    #[serde(default)]
    pub secondary_sources: Vec<SourceSecondary>,
    /// Unique key terms. Serialized as a sorted array.
    #[serde(default)]
    pub key_terms: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_queries: Option<Vec<String>>,
}

/// Inline file attached to a chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Cached translation of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Translation {
    pub text: String,
    pub lang: String,
    pub active: bool,
}

/// One chat turn as held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Option<Vec<Attachment>>,
    /// `true` while a model response is still arriving. Never persisted as `true`.
    pub is_streaming: bool,
    pub translation: Option<Translation>,
}

impl ChatMessage {
    /// New turn with a fresh UUID v7 and the current time.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            attachments: None,
            is_streaming: false,
            translation: None,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        if !attachments.is_empty() {
            self.attachments = Some(attachments);
        }
        self
    }

    pub fn streaming(mut self) -> Self {
        self.is_streaming = true;
        self
    }

    /// Storage form: epoch-ms timestamp, streaming flag dropped.
    pub fn to_stored(&self) -> StoredMessage {
        StoredMessage {
            id: self.id.clone(),
            role: self.role,
            text: self.text.clone(),
            timestamp: StoredTimestamp::Millis(self.timestamp.timestamp_millis()),
            attachments: self.attachments.clone(),
            is_streaming: None,
            translation: self.translation.clone(),
        }
    }
}

/// The canonical in-memory session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub agent_name: String,
    pub persona_text: String,
    pub knowledge_base: KnowledgeBase,
    pub messages: Vec<ChatMessage>,
    pub theme: Theme,
    pub mode: ThemeMode,
    /// Epoch ms of the last write, informational only.
    pub last_updated: Option<i64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            agent_name: super::defaults::DEFAULT_AGENT_NAME.to_string(),
            persona_text: super::defaults::DEFAULT_PERSONA.to_string(),
            knowledge_base: super::defaults::default_knowledge_base(),
            messages: Vec::new(),
            theme: Theme::default(),
            mode: ThemeMode::default(),
            last_updated: None,
        }
    }
}

impl SessionState {
    /// Serialize for persistence, stamping `lastUpdated` with `now_ms`.
    pub fn to_stored(&self, now_ms: i64) -> StoredSession {
        StoredSession {
            app_name: self.agent_name.clone(),
            persona: self.persona_text.clone(),
            syllabus_data: self.knowledge_base.clone(),
            messages: self.messages.iter().map(ChatMessage::to_stored).collect(),
            theme: self.theme,
            mode: self.mode,
            last_updated: now_ms,
        }
    }

    /// The export document (no `lastUpdated`).
    pub fn to_export(&self) -> ExportDocument {
        ExportDocument {
            app_name: self.agent_name.clone(),
            persona: self.persona_text.clone(),
            syllabus_data: self.knowledge_base.clone(),
            messages: self.messages.iter().map(ChatMessage::to_stored).collect(),
            theme: self.theme,
            mode: self.mode,
        }
    }

    pub fn find_message_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}

/// A message timestamp as found in a store: epoch ms or an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredTimestamp {
    Millis(i64),
    Float(f64),
    Text(String),
}

impl StoredTimestamp {
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, String> {
        match self {
            Self::Millis(ms) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {ms}")),
            Self::Float(ms) => {
                if !ms.is_finite() {
                    return Err(format!("timestamp is not finite: {ms}"));
                }
                Self::Millis(ms.round() as i64).to_datetime()
            }
            Self::Text(s) => parse_text_timestamp(s),
        }
    }
}

fn parse_text_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // numeric strings, e.g. a bigint column rendered as text
    if let Ok(ms) = s.trim().parse::<i64>() {
        return StoredTimestamp::Millis(ms).to_datetime();
    }
    // ISO without offset is read as UTC; Postgres renders it with a space
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("unparseable timestamp {s:?}: {e}"))
}

/// One chat turn as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub text: String,
    pub timestamp: StoredTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    /// Only ever read: a stale `true` from an older writer is dropped on hydration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_streaming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<Translation>,
}

impl StoredMessage {
    /// Rehydrate into the in-memory form. Streaming is always reset.
    pub fn hydrate(self) -> Result<ChatMessage, String> {
        let timestamp = self
            .timestamp
            .to_datetime()
            .map_err(|e| format!("message {}: {e}", self.id))?;
        Ok(ChatMessage {
            id: self.id,
            role: self.role,
            text: self.text,
            timestamp,
            attachments: self.attachments,
            is_streaming: false,
            translation: self.translation,
        })
    }
}

/// Full persisted record, the shape written to every store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub app_name: String,
    pub persona: String,
    pub syllabus_data: KnowledgeBase,
    pub messages: Vec<StoredMessage>,
    pub theme: Theme,
    pub mode: ThemeMode,
    pub last_updated: i64,
}

/// Downloadable configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub app_name: String,
    pub persona: String,
    pub syllabus_data: KnowledgeBase,
    pub messages: Vec<StoredMessage>,
    pub theme: Theme,
    pub mode: ThemeMode,
}

/// Partial session record: every field optional.
///
/// Used for remote loads, local loads, and imported documents alike. Empty
/// strings deserialize to `None` so a blank remote field never clobbers local state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, deserialize_with = "non_empty_string", skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub syllabus_data: Option<KnowledgeBase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<StoredMessage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ThemeMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

impl From<StoredSession> for SessionPatch {
    fn from(s: StoredSession) -> Self {
        Self {
            app_name: Some(s.app_name).filter(|v| !v.is_empty()),
            persona: Some(s.persona).filter(|v| !v.is_empty()),
            syllabus_data: Some(s.syllabus_data),
            messages: Some(s.messages),
            theme: Some(s.theme),
            mode: Some(s.mode),
            last_updated: Some(s.last_updated),
        }
    }
}

fn non_empty_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

/// A registered user's identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub email: String,
    pub mobile: String,
    /// Epoch ms.
    pub registered_at: i64,
}

impl UserProfile {
    /// Document key: email with every non-alphanumeric character replaced by `_`,
    /// falling back to the mobile number, then to `unknown_user`.
    pub fn storage_key(&self) -> String {
        let from_email: String = self
            .email
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if !from_email.is_empty() {
            from_email
        } else if !self.mobile.is_empty() {
            self.mobile.clone()
        } else {
            "unknown_user".to_string()
        }
    }
}
