use anyhow::{Context, Result};
use std::path::Path;

use crate::config::SamsayaConfig;

/// Write the export document as pretty JSON to `output`, or stdout.
pub async fn export(config: SamsayaConfig, output: Option<&Path>) -> Result<()> {
    let state = crate::server::setup_shared_state(config).await?;
    let document = state.coordinator.export_document();
    let json = serde_json::to_string_pretty(&document)?;

    match output {
        Some(path) => {
            std::fs::write(path, &json)
                .with_context(|| format!("failed to write export file: {}", path.display()))?;
            eprintln!("Configuration saved to {}", path.display());
        }
        None => println!("{json}"),
    }

    eprintln!(
        "Exported {} messages and {} primary sources.",
        document.messages.len(),
        document.syllabus_data.primary_sources_en.len()
    );
    Ok(())
}
