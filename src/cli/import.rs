use anyhow::{Context, Result};
use std::path::Path;

use crate::config::SamsayaConfig;

/// Merge a configuration document into the session and persist it.
///
/// Fields missing from the document keep their current values.
pub async fn import(config: SamsayaConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let state = crate::server::setup_shared_state(config).await?;
    let outcome = state.coordinator.import_document(&json)?;

    if !outcome.changed() {
        println!("Nothing to import: session already matches {}", file.display());
        return Ok(());
    }

    let report = state.coordinator.flush_now().await;

    println!("Configuration loaded successfully!");
    for (field, changed) in [
        ("app name", outcome.agent_name),
        ("persona", outcome.persona),
        ("knowledge base", outcome.knowledge_base),
        ("messages", outcome.messages),
        ("theme", outcome.theme),
        ("mode", outcome.mode),
    ] {
        if changed {
            println!("  Updated: {field}");
        }
    }
    super::session::print_flush(&report);
    Ok(())
}
