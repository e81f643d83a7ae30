use std::path::{Path, PathBuf};

use agent_commander_core::agentdefs::AgentKind;
use agent_commander_core::config::AppConfig;
use anyhow::Result;

/// First-run onboarding: probe `PATH` for the three wrapped CLI binaries
/// and write a default `config.toml` if one doesn't exist yet.
pub async fn run() -> Result<()> {
    println!("Checking for agent CLIs on PATH...");
    for agent in AgentKind::all() {
        match find_on_path(&agent.resolve_command()) {
            Some(path) => println!("  [found]   {:<8} -> {}", agent.as_str(), path.display()),
            None => println!("  [missing] {:<8} (set AGENT_COMMANDER_{}_CMD to override)", agent.as_str(), agent.as_str().to_uppercase()),
        }
    }

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        let config = AppConfig::default();
        config.save_to(&config_path).await?;
        println!("Wrote default config to {}", config_path.display());
    }

    Ok(())
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if cfg!(windows) {
            let candidate_exe = dir.join(format!("{name}.exe"));
            if candidate_exe.is_file() {
                return Some(candidate_exe);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
