use anyhow::{Context, Result};

use crate::config::SamsayaConfig;
use crate::llm::{set_user_api_key, KeyUpdate};
use crate::store::local::LocalStore;

/// Save (or with empty input, clear) the user's Gemini API key.
pub fn key(config: &SamsayaConfig, key: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let local = LocalStore::open(&db_path)
        .with_context(|| format!("failed to open local store at {}", db_path.display()))?;

    match set_user_api_key(&local, key)? {
        KeyUpdate::Saved => println!("API Key updated successfully."),
        KeyUpdate::Cleared => println!("Custom API Key cleared. Using default key if available."),
    }
    Ok(())
}
