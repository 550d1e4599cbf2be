//! CLI `session` command: summarise the reconciled session.

use anyhow::Result;

use crate::config::SamsayaConfig;
use crate::session::types::Role;
use crate::sync::coordinator::FlushReport;

pub async fn session(config: SamsayaConfig) -> Result<()> {
    let state = crate::server::setup_shared_state(config).await?;
    let coord = &state.coordinator;
    let snapshot = coord.snapshot();
    let kb = &snapshot.knowledge_base;

    println!("Session {}", coord.session_id());
    println!("{}", "=".repeat(40));
    println!("  Agent name:        {}", snapshot.agent_name);
    println!("  Theme:             {} ({})", snapshot.theme, snapshot.mode);
    if let Some(ts) = snapshot.last_updated {
        println!("  Last updated:      {ts}");
    }
    println!();

    println!("Knowledge base: {}", kb.project_title);
    println!("  Core concept:      {}", kb.core_concept);
    println!("  Primary (en):      {}", kb.primary_sources_en.len());
    println!("  Primary (bn):      {}", kb.primary_sources_bn.len());
    println!("  Secondary:         {}", kb.secondary_sources.len());
    println!("  Key terms:         {}", kb.key_terms.len());
    println!();

    let user_turns = snapshot.messages.iter().filter(|m| m.role == Role::User).count();
    println!("Messages:            {}", snapshot.messages.len());
    println!("  User turns:        {user_turns}");
    println!("  Model turns:       {}", snapshot.messages.len() - user_turns);
    println!();

    println!("Remote stores:");
    let remotes = coord.remote_status();
    if remotes.is_empty() {
        println!("  (none configured)");
    }
    for remote in remotes {
        let status = if remote.initialized { "connected" } else { "unavailable" };
        println!("  {:<18} {status}", remote.store);
    }
    Ok(())
}

/// Print a one-line-per-store summary of a flush.
pub fn print_flush(report: &FlushReport) {
    match &report.local_error {
        None => println!("Saved locally."),
        Some(e) => eprintln!("Local save failed: {e}"),
    }
    for remote in &report.remotes {
        match &remote.error {
            None => println!("Synced to {}.", remote.store),
            Some(e) => eprintln!("Sync to {} failed: {e}", remote.store),
        }
    }
}
