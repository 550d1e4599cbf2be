use anyhow::Result;
use std::io::Write;

use crate::config::SamsayaConfig;
use crate::llm::ChatOptions;
use crate::sync::chat;

/// Send one message and stream the reply to stdout.
pub async fn chat(config: SamsayaConfig, text: &str, options: ChatOptions) -> Result<()> {
    let state = crate::server::setup_shared_state(config).await?;

    // snapshots are cumulative; print only what is new
    let mut printed = 0usize;
    let mut print_suffix = |partial: &str| {
        if let Some(rest) = partial.get(printed..) {
            print!("{rest}");
            let _ = std::io::stdout().flush();
            printed = partial.len();
        }
    };

    let outcome = chat::send_message_observed(
        &state.coordinator,
        state.model.as_ref(),
        text,
        Vec::new(),
        options,
        &mut print_suffix,
    )
    .await;

    match &outcome.error {
        Some(error) => {
            println!("{}", outcome.reply);
            eprintln!("error: {error}");
        }
        None => println!(),
    }

    let report = state.coordinator.flush_now().await;
    super::session::print_flush(&report);
    Ok(())
}
