use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use samsaya::config::SamsayaConfig;
use samsaya::llm::ChatOptions;
use samsaya::{cli, server};

#[derive(Parser)]
#[command(name = "samsaya", version, about = "Grounded research chat with local-first session sync")]
struct Cli {
    /// Config file (defaults to ~/.samsaya/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Print a summary of the current session
    Session,
    /// Send one message and stream the reply
    Chat {
        text: String,
        /// Use the reasoning model
        #[arg(long)]
        think: bool,
        /// Enable the search tool
        #[arg(long)]
        search: bool,
        /// Site or topic to focus searches on
        #[arg(long)]
        focus: Option<String>,
    },
    /// Clear the chat history
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
    /// Export agent configuration and messages as JSON
    Export {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Merge a previously exported configuration
    Import { file: PathBuf },
    /// Save a Gemini API key (empty to clear)
    Key {
        #[arg(default_value = "")]
        key: String,
    },
    /// Check the local store and remote connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SamsayaConfig::load_from(path)?,
        None => SamsayaConfig::load()?,
    };

    // stdout is reserved for command output
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => server::serve(config).await?,
        Command::Session => cli::session::session(config).await?,
        Command::Chat {
            text,
            think,
            search,
            focus,
        } => {
            let options = ChatOptions {
                use_thinking: think,
                use_search: search,
                search_focus: focus,
            };
            cli::chat::chat(config, &text, options).await?;
        }
        Command::Clear { yes } => cli::clear::clear(config, yes).await?,
        Command::Export { output } => cli::export::export(config, output.as_deref()).await?,
        Command::Import { file } => cli::import::import(config, &file).await?,
        Command::Key { key } => cli::key::key(&config, &key)?,
        Command::Doctor => cli::doctor::doctor(&config).await?,
    }

    Ok(())
}
