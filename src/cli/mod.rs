//! CLI surface for the `agent-commander` binary.

mod gui;
mod heartbeat;
mod onboard;
mod status;

pub use gui::run as run_gui;
pub use heartbeat::run as run_heartbeat;
pub use onboard::run as run_onboard;
pub use status::run as run_status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agent-commander")]
#[command(about = "Orchestrates claude/gemini/codex CLI agents behind one chat surface")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// The GUI is a separate artifact; this just confirms the core is reachable.
    Gui,
    /// First-run setup: probe PATH for agent binaries, write a default config.
    Onboard,
    /// Trigger a single scheduler tick and exit.
    Heartbeat,
    /// Print resolved configuration, known sessions, and proxy health.
    Status,
}
