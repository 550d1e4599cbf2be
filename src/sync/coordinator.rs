//! The session coordinator: sole owner of the in-memory [`SessionState`].
//!
//! Startup reads the local record synchronously, then fans out to every remote
//! adapter and merges whatever each returns in arrival order. Every mutation
//! arms the debounced flush; the flush writes the local store first and then
//! each initialized remote independently.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::task::JoinSet;

use crate::config::{MergePolicy, SyncConfig};
use crate::session::defaults::{default_knowledge_base, DEFAULT_AGENT_NAME, DEFAULT_PERSONA};
use crate::llm::AgentConfiguration;
use crate::session::knowledge::{self, GeneratedKnowledge, SourceAnalysis, SourceMerge};
use crate::session::merge::{apply_patch, MergeError, MergeOutcome};
use crate::session::types::{
    ChatMessage, ExportDocument, KnowledgeBase, SessionPatch, SessionState, SourcePrimary,
    Theme, ThemeMode, Translation,
};
use crate::store::local::LocalStore;
use crate::store::{RemoteStore, StoreError, StoreResult};

use super::debounce::Debouncer;

/// What happened to one remote during hydration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteLoad {
    /// `initialize()` failed; the store is skipped for this process.
    Unavailable,
    NoRecord,
    Applied { changed: bool },
    /// Older than a record already merged (only under [`MergePolicy::Newest`]).
    Skipped,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteLoadReport {
    pub store: &'static str,
    #[serde(flatten)]
    pub outcome: RemoteLoad,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteSaveReport {
    pub store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one flush. Failures are reported, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct FlushReport {
    pub last_updated: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_error: Option<String>,
    pub remotes: Vec<RemoteSaveReport>,
}

impl FlushReport {
    pub fn all_ok(&self) -> bool {
        self.local_error.is_none() && self.remotes.iter().all(|r| r.error.is_none())
    }
}

/// Per-remote connection status.
#[derive(Debug, Clone, Serialize)]
pub struct RemoteStatus {
    pub store: &'static str,
    pub initialized: bool,
}

/// Whether a mutation's return value means the state was modified.
trait Touched {
    fn touched(&self) -> bool;
}

impl Touched for () {
    fn touched(&self) -> bool {
        true
    }
}

/// `false` is a miss: unknown message id, nothing to toggle.
impl Touched for bool {
    fn touched(&self) -> bool {
        *self
    }
}

impl<T> Touched for Option<T> {
    fn touched(&self) -> bool {
        self.is_some()
    }
}

#[derive(Clone)]
pub struct SessionCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    session_id: String,
    state: Mutex<SessionState>,
    local: Arc<LocalStore>,
    remotes: Vec<Arc<dyn RemoteStore>>,
    debouncer: Debouncer,
    merge_policy: MergePolicy,
    /// Newest `lastUpdated` among remote records merged so far.
    newest_remote: Mutex<Option<i64>>,
}

impl SessionCoordinator {
    /// Resolve the session id and hydrate from the local store.
    ///
    /// A corrupt local record is logged and replaced by defaults; a failing
    /// local database is returned as an error.
    pub fn open(
        local: Arc<LocalStore>,
        remotes: Vec<Arc<dyn RemoteStore>>,
        sync: &SyncConfig,
    ) -> StoreResult<Self> {
        let session_id = local.session_id()?;
        let mut state = SessionState::default();

        match local.load_state(&session_id) {
            Ok(Some(patch)) => {
                if let Err(e) = apply_patch(&mut state, patch) {
                    tracing::warn!(session_id = %session_id, error = %e, "local session unreadable, using defaults");
                    state = SessionState::default();
                }
            }
            Ok(None) => {
                tracing::info!(session_id = %session_id, "no local session, starting from defaults");
            }
            Err(e @ StoreError::Parse { .. }) => {
                tracing::warn!(session_id = %session_id, error = %e, "local session unreadable, using defaults");
            }
            Err(e) => return Err(e),
        }

        Ok(Self {
            inner: Arc::new(Inner {
                session_id,
                state: Mutex::new(state),
                local,
                remotes,
                debouncer: Debouncer::new(sync.debounce()),
                merge_policy: sync.merge_policy,
                newest_remote: Mutex::new(None),
            }),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.lock_state().clone()
    }

    pub fn remote_status(&self) -> Vec<RemoteStatus> {
        self.inner
            .remotes
            .iter()
            .map(|r| RemoteStatus {
                store: r.name(),
                initialized: r.is_initialized(),
            })
            .collect()
    }

    /// Whether a debounced flush is waiting to fire.
    pub fn flush_pending(&self) -> bool {
        self.inner.debouncer.is_pending()
    }

    /// Initialize and load every remote concurrently, merging results as they arrive.
    pub async fn hydrate_remotes(&self) -> Vec<RemoteLoadReport> {
        let mut tasks = JoinSet::new();
        for remote in self.inner.remotes.iter().cloned() {
            let session_id = self.inner.session_id.clone();
            tasks.spawn(async move {
                let name = remote.name();
                if !remote.initialize().await {
                    return (name, None);
                }
                (name, Some(remote.load(&session_id).await))
            });
        }

        let mut reports = Vec::with_capacity(self.inner.remotes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((store, result)) => {
                    let outcome = self.apply_remote(store, result);
                    reports.push(RemoteLoadReport { store, outcome });
                }
                Err(e) => tracing::error!(error = %e, "remote load task failed"),
            }
        }
        reports
    }

    fn apply_remote(
        &self,
        store: &'static str,
        result: Option<StoreResult<Option<SessionPatch>>>,
    ) -> RemoteLoad {
        let patch = match result {
            None => {
                tracing::info!(store, "remote store unavailable, skipping");
                return RemoteLoad::Unavailable;
            }
            Some(Ok(None)) => {
                tracing::debug!(store, "no remote session record");
                return RemoteLoad::NoRecord;
            }
            Some(Err(e)) => {
                log_store_error(store, "load", &e);
                return RemoteLoad::Failed {
                    error: e.to_string(),
                };
            }
            Some(Ok(Some(patch))) => patch,
        };

        if self.inner.merge_policy == MergePolicy::Newest {
            let mut newest = self
                .inner
                .newest_remote
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if let (Some(seen), Some(incoming)) = (*newest, patch.last_updated) {
                if incoming < seen {
                    tracing::info!(store, incoming, seen, "remote record older than one already merged");
                    return RemoteLoad::Skipped;
                }
            }
            if let Some(incoming) = patch.last_updated {
                *newest = Some(newest.map_or(incoming, |seen| seen.max(incoming)));
            }
        }

        match self.merge(patch) {
            Ok(outcome) => {
                tracing::info!(store, changed = outcome.changed(), "merged remote session");
                RemoteLoad::Applied {
                    changed: outcome.changed(),
                }
            }
            Err(e) => {
                tracing::warn!(store, error = %e, "remote session malformed, ignoring");
                RemoteLoad::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Merge a partial record; schedules a flush when anything changed.
    fn merge(&self, patch: SessionPatch) -> Result<MergeOutcome, MergeError> {
        let outcome = {
            let mut state = self.inner.lock_state();
            apply_patch(&mut state, patch)?
        };
        if outcome.changed() {
            self.schedule_flush();
        }
        Ok(outcome)
    }

    /// Run `f` under the state lock and arm the flush if it touched anything.
    fn mutate<R: Touched>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let result = {
            let mut state = self.inner.lock_state();
            f(&mut state)
        };
        if result.touched() {
            self.schedule_flush();
        }
        result
    }

    fn schedule_flush(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.debouncer.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.flush().await;
            }
        });
    }

    /// Persist now, bypassing the debounce.
    pub async fn flush_now(&self) -> FlushReport {
        self.inner.debouncer.cancel();
        self.inner.flush().await
    }

    pub fn update_agent_name(&self, name: &str) {
        let name = name.trim();
        let name = if name.is_empty() { DEFAULT_AGENT_NAME } else { name };
        self.mutate(|s| s.agent_name = name.to_string());
    }

    pub fn update_persona(&self, persona: &str) {
        let persona = if persona.trim().is_empty() {
            DEFAULT_PERSONA
        } else {
            persona
        };
        self.mutate(|s| s.persona_text = persona.to_string());
    }

    pub fn update_knowledge_base(&self, kb: KnowledgeBase) {
        self.mutate(|s| s.knowledge_base = kb);
    }

    pub fn update_theme(&self, theme: Theme) {
        self.mutate(|s| s.theme = theme);
    }

    pub fn update_mode(&self, mode: ThemeMode) {
        self.mutate(|s| s.mode = mode);
    }

    /// Replace the suggested queries from comma-separated input. Blank input is ignored.
    pub fn set_suggested_queries(&self, input: &str) {
        let queries = knowledge::parse_suggested_queries(input);
        if queries.is_empty() {
            return;
        }
        self.mutate(|s| s.knowledge_base.suggested_queries = Some(queries));
    }

    /// Agent name, persona, and knowledge base back to their defaults.
    pub fn reset_configuration(&self) {
        self.mutate(|s| {
            s.agent_name = DEFAULT_AGENT_NAME.to_string();
            s.persona_text = DEFAULT_PERSONA.to_string();
            s.knowledge_base = default_knowledge_base();
        });
    }

    pub fn add_knowledge_source(&self, title: &str, content: &str, analysis: SourceAnalysis) {
        self.mutate(|s| knowledge::add_source(&mut s.knowledge_base, title, content, analysis));
    }

    pub fn remove_knowledge_source(&self, index: usize) -> Option<SourcePrimary> {
        self.mutate(|s| knowledge::remove_source(&mut s.knowledge_base, index))
    }

    /// Fold a knowledge base generated from the persona in, after the existing sources.
    pub fn apply_generated_knowledge(&self, generated: GeneratedKnowledge) {
        self.mutate(|s| knowledge::apply_generated(&mut s.knowledge_base, generated, SourceMerge::Append));
        tracing::info!("knowledge base populated from persona");
    }

    /// Adopt a generated name, persona and knowledge base in one step.
    pub fn apply_agent_configuration(&self, config: AgentConfiguration) {
        let AgentConfiguration {
            app_name,
            persona,
            knowledge_base,
        } = config;
        self.mutate(|s| {
            s.agent_name = app_name;
            s.persona_text = persona;
            knowledge::apply_generated(&mut s.knowledge_base, knowledge_base, SourceMerge::Replace);
        });
        tracing::info!("agent configuration generated");
    }

    /// Append a turn and return its id.
    pub fn push_message(&self, message: ChatMessage) -> String {
        let id = message.id.clone();
        self.mutate(|s| s.messages.push(message));
        id
    }

    /// Replace a message's text. Returns `false` when the id is unknown.
    pub fn update_message_text(&self, id: &str, text: &str) -> bool {
        self.mutate(|s| match s.find_message_mut(id) {
            Some(m) => {
                m.text = text.to_string();
                true
            }
            None => false,
        })
    }

    /// Clear the streaming flag on a message.
    pub fn finish_message(&self, id: &str) -> bool {
        self.mutate(|s| match s.find_message_mut(id) {
            Some(m) => {
                m.is_streaming = false;
                true
            }
            None => false,
        })
    }

    /// Cache a translation on a message and show it.
    pub fn set_translation(&self, id: &str, text: String, lang: String) -> bool {
        self.mutate(|s| match s.find_message_mut(id) {
            Some(m) => {
                m.translation = Some(Translation {
                    text,
                    lang,
                    active: true,
                });
                true
            }
            None => false,
        })
    }

    /// Flip the visibility of a cached translation. `None` when there is nothing to toggle.
    pub fn toggle_translation(&self, id: &str) -> Option<bool> {
        self.mutate(|s| {
            let translation = s.find_message_mut(id)?.translation.as_mut()?;
            translation.active = !translation.active;
            Some(translation.active)
        })
    }

    pub fn message(&self, id: &str) -> Option<ChatMessage> {
        let state = self.inner.lock_state();
        state.messages.iter().find(|m| m.id == id).cloned()
    }

    /// Empty the message list and persist immediately.
    pub async fn clear_history(&self) -> FlushReport {
        self.inner.debouncer.cancel();
        self.inner.lock_state().messages.clear();
        tracing::info!(session_id = %self.inner.session_id, "chat history cleared");
        self.inner.flush().await
    }

    /// Start over with an empty conversation, keeping configuration.
    pub async fn start_new_chat(&self) -> FlushReport {
        self.inner.debouncer.cancel();
        self.inner.lock_state().messages.clear();
        tracing::info!(session_id = %self.inner.session_id, "new chat started");
        self.inner.flush().await
    }

    pub fn export_document(&self) -> ExportDocument {
        self.inner.lock_state().to_export()
    }

    /// Merge a user-supplied document. Unlike remote loads, errors reach the caller.
    pub fn import_document(&self, json: &str) -> anyhow::Result<MergeOutcome> {
        let patch: SessionPatch = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("invalid config file: {e}"))?;
        let outcome = self.merge(patch)?;
        tracing::info!(changed = outcome.changed(), "configuration imported");
        Ok(outcome)
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn flush(&self) -> FlushReport {
        let now = Utc::now().timestamp_millis();
        let stored = {
            let mut state = self.lock_state();
            state.last_updated = Some(now);
            Arc::new(state.to_stored(now))
        };

        let local_error = match self.local.save_state(&self.session_id, &stored) {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, "local save failed");
                Some(e.to_string())
            }
        };

        let mut tasks = JoinSet::new();
        for remote in self.remotes.iter().filter(|r| r.is_initialized()).cloned() {
            let session_id = self.session_id.clone();
            let stored = Arc::clone(&stored);
            tasks.spawn(async move {
                let store = remote.name();
                let error = match remote.save(&session_id, &stored).await {
                    Ok(()) => None,
                    Err(e) => {
                        log_store_error(store, "save", &e);
                        Some(e.to_string())
                    }
                };
                RemoteSaveReport { store, error }
            });
        }

        let mut remotes = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => remotes.push(report),
                Err(e) => tracing::error!(error = %e, "remote save task failed"),
            }
        }

        tracing::debug!(
            session_id = %self.session_id,
            messages = stored.messages.len(),
            remotes = remotes.len(),
            "session flushed"
        );
        FlushReport {
            last_updated: now,
            local_error,
            remotes,
        }
    }
}

fn log_store_error(store: &'static str, op: &str, err: &StoreError) {
    if err.is_permission() {
        tracing::warn!(store, op, error = %err, "remote store permission denied, check access rules");
    } else {
        tracing::error!(store, op, error = %err, "remote store request failed");
    }
}
