use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct SamsayaConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub firestore: FirestoreConfig,
    pub supabase: SupabaseConfig,
    pub llm: LlmConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// How concurrent remote loads are reconciled.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Every remote record is merged as it arrives; the last responder wins.
    #[default]
    Arrival,
    /// A remote record older than one already merged is skipped.
    Newest,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub debounce_ms: u64,
    pub merge_policy: MergePolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FirestoreConfig {
    pub enabled: bool,
    pub api_key: String,
    pub project_id: String,
    pub auth_url: String,
    pub token_url: String,
    pub base_url: String,
    pub sessions_collection: String,
    pub users_collection: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SupabaseConfig {
    pub enabled: bool,
    pub url: String,
    pub anon_key: String,
    pub session_table: String,
    pub user_table: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub thinking_model: String,
    pub history_limit: usize,
    pub thinking_budget: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub guest_limit_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8787,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_samsaya_dir()
            .join("local.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            merge_policy: MergePolicy::Arrival,
        }
    }
}

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: String::new(),
            project_id: String::new(),
            auth_url: "https://identitytoolkit.googleapis.com/v1".into(),
            token_url: "https://securetoken.googleapis.com/v1/token".into(),
            base_url: "https://firestore.googleapis.com/v1".into(),
            sessions_collection: "sessions".into(),
            users_collection: "users".into(),
            timeout_secs: 15,
        }
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            anon_key: String::new(),
            session_table: "Session".into(),
            user_table: "User".into(),
            timeout_secs: 15,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            thinking_model: "gemini-3-pro-preview".into(),
            history_limit: 15,
            thinking_budget: 32768,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            guest_limit_minutes: 60,
        }
    }
}

impl FirestoreConfig {
    /// Enabled and carrying credentials.
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.api_key.is_empty() && !self.project_id.is_empty()
    }
}

impl SupabaseConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.url.is_empty() && !self.anon_key.is_empty()
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Returns `~/.samsaya/`
pub fn default_samsaya_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".samsaya")
}

/// Returns the default config file path: `~/.samsaya/config.toml`
pub fn default_config_path() -> PathBuf {
    default_samsaya_dir().join("config.toml")
}

impl SamsayaConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            SamsayaConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SAMSAYA_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("SAMSAYA_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Some(port) = std::env::var("SAMSAYA_PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("SUPABASE_URL") {
            self.supabase.url = val;
        }
        if let Ok(val) = std::env::var("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = val;
        }
        if let Ok(val) = std::env::var("FIREBASE_API_KEY") {
            self.firestore.api_key = val;
        }
        if let Ok(val) = std::env::var("FIREBASE_PROJECT_ID") {
            self.firestore.project_id = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SamsayaConfig::default();
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.sync.debounce_ms, 2000);
        assert_eq!(config.sync.merge_policy, MergePolicy::Arrival);
        assert_eq!(config.llm.history_limit, 15);
        assert!(config.storage.db_path.ends_with("local.db"));
        assert!(!config.firestore.is_configured());
        assert!(!config.supabase.is_configured());
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[sync]
debounce_ms = 500
merge_policy = "newest"

[supabase]
url = "https://abc.supabase.co"
anon_key = "anon"
"#;
        let config: SamsayaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.sync.debounce(), Duration::from_millis(500));
        assert_eq!(config.sync.merge_policy, MergePolicy::Newest);
        assert!(config.supabase.is_configured());
        // defaults still apply for unset fields
        assert_eq!(config.supabase.session_table, "Session");
        assert_eq!(config.server.port, 8787);
    }

    #[test]
    fn disabled_store_is_not_configured() {
        let toml_str = r#"
[firestore]
enabled = false
api_key = "k"
project_id = "p"
"#;
        let config: SamsayaConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.firestore.is_configured());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = SamsayaConfig::default();
        std::env::set_var("SAMSAYA_DB", "/tmp/override.db");
        std::env::set_var("SAMSAYA_LOG_LEVEL", "trace");
        std::env::set_var("SAMSAYA_PORT", "9100");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.server.log_level, "trace");
        assert_eq!(config.server.port, 9100);

        std::env::remove_var("SAMSAYA_DB");
        std::env::remove_var("SAMSAYA_LOG_LEVEL");
        std::env::remove_var("SAMSAYA_PORT");
    }
}
