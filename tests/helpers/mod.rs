#![allow(dead_code)]

use async_trait::async_trait;
use samsaya::config::{MergePolicy, SyncConfig};
use samsaya::llm::{AgentConfiguration, ChatModel, ChatRequest, LlmError, PersonaVariation};
use samsaya::session::knowledge::{GeneratedKnowledge, SourceAnalysis};
use samsaya::session::types::{SessionPatch, SourcePrimary, StoredSession, UserProfile};
use samsaya::store::local::LocalStore;
use samsaya::store::{RemoteStore, StoreError, StoreResult};
use samsaya::sync::SessionCoordinator;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fresh in-memory local store.
pub fn test_local() -> Arc<LocalStore> {
    Arc::new(LocalStore::in_memory().unwrap())
}

pub fn sync_config(debounce_ms: u64) -> SyncConfig {
    SyncConfig {
        debounce_ms,
        merge_policy: MergePolicy::Arrival,
    }
}

pub fn open_coordinator(local: Arc<LocalStore>, remotes: Vec<Arc<dyn RemoteStore>>) -> SessionCoordinator {
    SessionCoordinator::open(local, remotes, &sync_config(2000)).unwrap()
}

/// How a [`FakeRemote`] answers.
#[derive(Clone)]
pub enum Behaviour {
    Record(SessionPatch),
    Empty,
    Denied,
    Offline,
}

/// In-process remote store with a configurable answer and latency.
pub struct FakeRemote {
    name: &'static str,
    init_ok: bool,
    ready: Mutex<bool>,
    latency: Duration,
    behaviour: Mutex<Behaviour>,
    pub saves: Mutex<Vec<StoredSession>>,
    pub profiles: Mutex<Vec<UserProfile>>,
    pub loads: Mutex<usize>,
}

impl FakeRemote {
    pub fn new(name: &'static str, behaviour: Behaviour) -> Self {
        Self {
            name,
            init_ok: true,
            ready: Mutex::new(false),
            latency: Duration::ZERO,
            behaviour: Mutex::new(behaviour),
            saves: Mutex::new(Vec::new()),
            profiles: Mutex::new(Vec::new()),
            loads: Mutex::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// A remote whose initialization fails.
    pub fn uninitializable(mut self) -> Self {
        self.init_ok = false;
        self
    }

    pub fn set_behaviour(&self, behaviour: Behaviour) {
        *self.behaviour.lock().unwrap() = behaviour;
    }

    pub fn saved(&self) -> Vec<StoredSession> {
        self.saves.lock().unwrap().clone()
    }

    pub fn load_count(&self) -> usize {
        *self.loads.lock().unwrap()
    }

    fn failure(&self) -> Option<StoreError> {
        match &*self.behaviour.lock().unwrap() {
            Behaviour::Denied => Some(StoreError::Permission {
                store: self.name,
                message: "HTTP 403 Forbidden".into(),
            }),
            Behaviour::Offline => Some(StoreError::Transport {
                store: self.name,
                message: "connection refused".into(),
            }),
            _ => None,
        }
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&self) -> bool {
        *self.ready.lock().unwrap() = self.init_ok;
        self.init_ok
    }

    fn is_initialized(&self) -> bool {
        *self.ready.lock().unwrap()
    }

    async fn load(&self, _session_id: &str) -> StoreResult<Option<SessionPatch>> {
        *self.loads.lock().unwrap() += 1;
        tokio::time::sleep(self.latency).await;
        if let Some(err) = self.failure() {
            return Err(err);
        }
        match &*self.behaviour.lock().unwrap() {
            Behaviour::Record(patch) => Ok(Some(patch.clone())),
            _ => Ok(None),
        }
    }

    async fn save(&self, _session_id: &str, state: &StoredSession) -> StoreResult<()> {
        tokio::time::sleep(self.latency).await;
        if let Some(err) = self.failure() {
            return Err(err);
        }
        self.saves.lock().unwrap().push(state.clone());
        Ok(())
    }

    async fn save_profile(&self, profile: &UserProfile) -> bool {
        if self.failure().is_some() {
            return false;
        }
        self.profiles.lock().unwrap().push(profile.clone());
        true
    }
}

/// Model that replays fixed chunks, or fails.
pub struct ScriptedModel {
    pub chunks: Vec<String>,
    pub fail: bool,
    pub requests: Mutex<Vec<ChatRequest>>,
    /// Inputs to the generation calls, in order.
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail: false,
            requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            chunks: Vec::new(),
            fail: true,
            requests: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(LlmError::NotConfigured);
        }
        let mut full = String::new();
        for chunk in &self.chunks {
            full.push_str(chunk);
            on_text(&full);
        }
        Ok(full)
    }

    async fn translate(&self, text: &str) -> Result<String, LlmError> {
        if self.fail {
            return Err(LlmError::NotConfigured);
        }
        Ok(format!("[bn] {text}"))
    }

    async fn analyze_source(&self, _content: &str) -> Result<SourceAnalysis, LlmError> {
        Err(LlmError::NotConfigured)
    }

    async fn persona_variations(&self, description: &str) -> Result<Vec<PersonaVariation>, LlmError> {
        self.record(description)?;
        Ok(["Balanced", "Academic", "Socratic"]
            .iter()
            .map(|tone| PersonaVariation {
                title: format!("{tone} Guide"),
                tone: tone.to_string(),
                content: format!("You are a {} guide to {description}.", tone.to_lowercase()),
            })
            .collect())
    }

    async fn draft_persona(&self, description: &str) -> Result<String, LlmError> {
        self.record(description)?;
        Ok(format!("You are a guide to {description}."))
    }

    async fn knowledge_from_persona(&self, persona: &str) -> Result<GeneratedKnowledge, LlmError> {
        self.record(persona)?;
        Ok(scripted_knowledge())
    }

    async fn configure_agent(&self, description: &str) -> Result<AgentConfiguration, LlmError> {
        self.record(description)?;
        Ok(AgentConfiguration {
            app_name: "Tide Scholar".into(),
            persona: format!("You are a guide to {description}."),
            knowledge_base: scripted_knowledge(),
        })
    }
}

impl ScriptedModel {
    fn record(&self, input: &str) -> Result<(), LlmError> {
        if self.fail {
            return Err(LlmError::NotConfigured);
        }
        self.prompts.lock().unwrap().push(input.to_string());
        Ok(())
    }
}

/// What [`ScriptedModel`] generates for knowledge requests.
pub fn scripted_knowledge() -> GeneratedKnowledge {
    GeneratedKnowledge {
        project_title: "Tidal Studies".into(),
        core_concept: "Estuaries".into(),
        primary_sources_en: vec![SourcePrimary {
            text: "The Hungry Tide".into(),
            author: Some("Amitav Ghosh".into()),
            ..Default::default()
        }],
        secondary_sources: Vec::new(),
        key_terms: vec!["Bonbibi".into()],
        suggested_queries: vec!["Who is Bonbibi?".into()],
    }
}
