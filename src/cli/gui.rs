use anyhow::Result;

/// The desktop GUI is a separate artifact that embeds `agent-commander-core`
/// directly; this binary does not own windowing. Exits 0 either way so
/// scripts that probe `agent-commander gui` as a capability check don't fail.
pub fn run() -> Result<()> {
    println!("The GUI is a separate artifact built on agent-commander-core.");
    println!("This binary only exposes the headless CLI surface (onboard, heartbeat, status).");
    Ok(())
}
