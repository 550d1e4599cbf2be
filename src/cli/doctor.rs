//! CLI `doctor` command: local store diagnostics plus remote connectivity.

use anyhow::{Context, Result};

use crate::config::SamsayaConfig;
use crate::db;
use crate::llm::resolve_api_key;
use crate::store::{self, local::LocalStore};

pub async fn doctor(config: &SamsayaConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Local store: not found at {}", db_path.display());
        println!("Run `samsaya serve` or `samsaya session` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;
    let local = LocalStore::new(conn);

    println!("Samsaya Health Report");
    println!("=====================");
    println!();
    println!("Local store:       {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("Keys:              {}", report.key_count);
    println!("Session records:   {}", report.session_count);
    println!(
        "Session id:        {}",
        local.existing_session_id()?.as_deref().unwrap_or("(not set)")
    );
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }
    println!();

    println!("Remote stores:");
    let remotes = store::build_remotes(config);
    if remotes.is_empty() {
        println!("  (none configured)");
    }
    for remote in &remotes {
        let status = if remote.initialize().await { "OK" } else { "FAILED" };
        println!("  {:<18} {status}", remote.name());
    }
    println!();

    let llm = match resolve_api_key(&local, &config.llm.api_key) {
        Ok(_) => "configured",
        Err(_) => "not configured (set GEMINI_API_KEY or run `samsaya key <KEY>`)",
    };
    println!("Gemini API key:    {llm}");

    if !report.integrity_ok {
        println!();
        println!("Recovery steps:");
        println!("  1. Export what is still readable: samsaya export --output backup.json");
        println!("  2. Move the damaged file aside and reimport: samsaya import backup.json");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
