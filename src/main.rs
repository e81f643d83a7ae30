//! `agent-commander` - orchestrates the `claude`, `gemini`, and `codex`
//! CLI agents behind one chat surface.
//!
//! This binary is the headless entry point: the chat surface itself
//! (Telegram bridge, web UI, etc.) lives in `agent-commander-core` and
//! whatever frontend embeds it. This binary only exposes onboarding,
//! a scheduler heartbeat, and a status readout.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Gui => cli::run_gui(),
        Commands::Onboard => cli::run_onboard().await,
        Commands::Heartbeat => cli::run_heartbeat().await,
        Commands::Status => cli::run_status().await,
    }
}
