use agent_commander_core::scheduler::{JobStore, SchedulerDaemon};
use anyhow::Result;

/// Triggers a single scheduler tick and exits, rather than running the
/// persistent minute-aligned loop (`SchedulerDaemon::start_loop`).
pub async fn run() -> Result<()> {
    let store = JobStore::new()?;
    let daemon = SchedulerDaemon::new(store);
    daemon.run_once().await?;
    println!("Scheduler tick complete.");
    Ok(())
}
