//! Persistence adapters.
//!
//! [`local::LocalStore`] is always available. The two remote adapters,
//! [`firestore::FirestoreStore`] (document database) and
//! [`supabase::SupabaseStore`] (relational table store), share the
//! [`RemoteStore`] contract so the coordinator can treat zero, one, or both
//! uniformly through an `initialized` flag.

pub mod firestore;
pub mod local;
pub mod supabase;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SamsayaConfig;
use crate::session::types::{SessionPatch, StoredSession, UserProfile};

/// Store failures. Permission and transport problems are kept apart so they
/// can be logged differently, though callers handle both the same way.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{store} is not configured or not initialized")]
    NotConfigured { store: &'static str },

    #[error("{store} denied access: {message}")]
    Permission { store: &'static str, message: String },

    #[error("{store} request failed: {message}")]
    Transport { store: &'static str, message: String },

    #[error("{store} returned an unreadable record: {message}")]
    Parse { store: &'static str, message: String },

    #[error("local store error: {0}")]
    Local(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shape shared by both remote adapters.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Short label used in logs (`"firestore"`, `"supabase"`).
    fn name(&self) -> &'static str;

    /// One-time setup. Idempotent: later calls return the cached result.
    async fn initialize(&self) -> bool;

    /// Whether a previous [`initialize`](Self::initialize) succeeded.
    fn is_initialized(&self) -> bool;

    /// Fetch the record for `session_id`. `Ok(None)` when none exists.
    async fn load(&self, session_id: &str) -> StoreResult<Option<SessionPatch>>;

    /// Upsert the full record keyed by `session_id`.
    async fn save(&self, session_id: &str, state: &StoredSession) -> StoreResult<()>;

    /// Persist a user-identity record keyed by [`UserProfile::storage_key`].
    /// Failures are logged and reported as `false`.
    async fn save_profile(&self, profile: &UserProfile) -> bool;
}

/// Construct every remote adapter the config enables, A before B.
pub fn build_remotes(config: &SamsayaConfig) -> Vec<Arc<dyn RemoteStore>> {
    let mut remotes: Vec<Arc<dyn RemoteStore>> = Vec::new();

    if config.firestore.is_configured() {
        remotes.push(Arc::new(firestore::FirestoreStore::new(config.firestore.clone())));
    } else {
        tracing::debug!("firestore sync not configured");
    }

    if config.supabase.is_configured() {
        remotes.push(Arc::new(supabase::SupabaseStore::new(config.supabase.clone())));
    } else {
        tracing::debug!("supabase sync not configured");
    }

    remotes
}

/// Map an HTTP status to the store error taxonomy.
pub(crate) fn status_error(store: &'static str, status: reqwest::StatusCode, body: String) -> StoreError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        StoreError::Permission {
            store,
            message: format!("HTTP {status}: {body}"),
        }
    } else {
        StoreError::Transport {
            store,
            message: format!("HTTP {status}: {body}"),
        }
    }
}

pub(crate) fn transport_error(store: &'static str, err: reqwest::Error) -> StoreError {
    StoreError::Transport {
        store,
        message: err.to_string(),
    }
}
