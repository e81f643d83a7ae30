use agent_commander_core::config::{AppConfig, TransportMode};
use agent_commander_core::proxysupervisor::ProxySupervisor;
use agent_commander_core::sessionstore::SessionStore;
use anyhow::Result;

pub async fn run() -> Result<()> {
    let config = AppConfig::load_or_default().await?;
    println!("Config file:    {}", AppConfig::config_path().display());
    println!("Workspace:      {}", config.workspace.display());
    println!("Default agent:  {}", config.default_agent);
    println!("Transport:      {:?}", config.transport);

    let sessions = SessionStore::new(config.workspace.join("sessions"));
    let index = sessions.read_index().await?;
    println!("\nKnown sessions: {}", index.len());
    for entry in &index {
        println!("  - {} [{}] agent={} updated_at={}", entry.session_id, entry.title, entry.agent, entry.updated_at);
    }

    if matches!(config.transport, TransportMode::ProxyApi) {
        let supervisor = ProxySupervisor::new(
            config.proxy.base_url.clone(),
            String::new(),
            String::new(),
            config.proxy.port,
            None,
        )?;
        match supervisor.health_check().await {
            Some(models) => println!("\nProxy:          healthy, {} model(s): {}", models.len(), models.join(", ")),
            None => println!("\nProxy:          unreachable at {}", config.proxy.base_url),
        }
    }

    Ok(())
}
