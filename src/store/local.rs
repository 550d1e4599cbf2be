//! Local persistent key/value store.
//!
//! Mirrors browser local storage on top of a SQLite table: every value is a
//! string (usually JSON) under a well-known key. The session state lives under
//! `ai_console_state_<session id>`; the session id itself under
//! [`SESSION_ID_KEY`].

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{StoreError, StoreResult};
use crate::session::types::{SessionPatch, StoredSession, UserProfile};

pub const SESSION_ID_KEY: &str = "ai_console_session_id";
pub const USER_PROFILE_KEY: &str = "ai_console_user_profile";
pub const GUEST_DATA_KEY: &str = "ai_console_guest_data";
pub const USER_API_KEY: &str = "gemini_user_api_key";
const STATE_KEY_PREFIX: &str = "ai_console_state_";

/// Key under which a session's state blob is kept.
pub fn state_key(session_id: &str) -> String {
    format!("{STATE_KEY_PREFIX}{session_id}")
}

pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        Ok(Self::new(crate::db::open_database(path)?))
    }

    /// Fresh in-memory store.
    pub fn in_memory() -> anyhow::Result<Self> {
        Ok(Self::new(crate::db::open_memory_database()?))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a poisoned lock still guards a consistent connection
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn().execute(
            "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> StoreResult<()> {
        self.conn()
            .execute("DELETE FROM local_storage WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Parse {
                    store: "local",
                    message: format!("{key}: {e}"),
                }),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    /// The stored session id, or `None` on a fresh profile.
    pub fn existing_session_id(&self) -> StoreResult<Option<String>> {
        Ok(self.get(SESSION_ID_KEY)?.filter(|s| !s.trim().is_empty()))
    }

    /// Return the stored session id, generating and persisting one on first use.
    pub fn session_id(&self) -> StoreResult<String> {
        if let Some(id) = self.existing_session_id()? {
            return Ok(id);
        }
        let id = uuid::Uuid::now_v7().to_string();
        self.set(SESSION_ID_KEY, &id)?;
        tracing::info!(session_id = %id, "generated new session id");
        Ok(id)
    }

    /// Load the session blob as a partial record.
    pub fn load_state(&self, session_id: &str) -> StoreResult<Option<SessionPatch>> {
        self.get_json(&state_key(session_id))
    }

    /// Overwrite the session blob.
    pub fn save_state(&self, session_id: &str, state: &StoredSession) -> StoreResult<()> {
        self.set_json(&state_key(session_id), state)
    }

    pub fn user_profile(&self) -> StoreResult<Option<UserProfile>> {
        self.get_json(USER_PROFILE_KEY)
    }

    pub fn set_user_profile(&self, profile: &UserProfile) -> StoreResult<()> {
        self.set_json(USER_PROFILE_KEY, profile)
    }

    pub fn guest_data<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        self.get_json(GUEST_DATA_KEY)
    }

    pub fn set_guest_data<T: Serialize>(&self, data: &T) -> StoreResult<()> {
        self.set_json(GUEST_DATA_KEY, data)
    }

    /// User-supplied LLM API key, if one was saved.
    pub fn user_api_key(&self) -> StoreResult<Option<String>> {
        Ok(self.get(USER_API_KEY)?.filter(|k| !k.is_empty()))
    }
}
