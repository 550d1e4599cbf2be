//! CLI `clear` command: empty the chat history after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use crate::config::SamsayaConfig;

pub async fn clear(config: SamsayaConfig, yes: bool) -> Result<()> {
    if !yes {
        print!("Clear all chat messages? This cannot be undone. Type YES to confirm: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if input.trim() != "YES" {
            bail!("clear cancelled");
        }
    }

    let state = crate::server::setup_shared_state(config).await?;
    let before = state.coordinator.snapshot().messages.len();
    let report = state.coordinator.clear_history().await;

    println!("Cleared {before} messages.");
    super::session::print_flush(&report);
    Ok(())
}
