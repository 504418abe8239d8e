//! Docent CLI: terminal front end for the Docent document Q&A pipeline.
//!
//! The CLI is purely a front end: it submits documents and questions to
//! the core pipeline and renders the answers. All coordination lives in
//! `docent-core`.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Docent: ask questions about your own documents
#[derive(Parser, Debug)]
#[command(name = "docent", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (defaults to ./docent.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Ingest documents and answer a single question
    Ask {
        /// The question to answer
        question: String,

        /// Document to ingest before answering (repeatable)
        #[arg(short, long = "doc", value_name = "FILE")]
        docs: Vec<PathBuf>,

        /// Print the full answer as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },
    /// Ingest documents, then answer questions interactively
    Chat {
        /// Document to ingest before the session (repeatable)
        #[arg(short, long = "doc", value_name = "FILE")]
        docs: Vec<PathBuf>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default docent.toml to the working directory
    Init,
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // DOCENT_LOG overrides the verbosity flags when set.
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_env("DOCENT_LOG").unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = docent_core::DocentConfig::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    match cli.command {
        Commands::Ask {
            question,
            docs,
            json,
        } => commands::ask(config, &docs, &question, json).await,
        Commands::Chat { docs } => commands::chat(config, &docs).await,
        Commands::Config { action } => commands::config(config, action),
    }
}
