//! Event contractor CLI - ctr command

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

/// Coalesce file system events per path before they reach a consumer
#[derive(Parser)]
#[command(name = "ctr")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay an event script and print the packed events as JSON lines
    Replay {
        /// Script file ("-" for stdin)
        input: String,
        /// Dispatcher config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Run through the interval-driven dispatch loop; flush steps are ignored
        #[arg(long)]
        streamed: bool,
    },
    /// Parse an event script and report what it contains
    Check {
        /// Script file ("-" for stdin)
        input: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries packed events only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { input, config, streamed } => {
            cmd::replay::run(&input, config.as_deref(), streamed).await
        }
        Commands::Check { input } => cmd::check::run(&input).await,
    }
}
