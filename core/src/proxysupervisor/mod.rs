//! Proxy server supervisor: manages the optional bundled
//! OpenAI-compatible proxy binary that `httptransport` talks to.
//! Spawns and tracks a child process the way the PTY backend does,
//! and resolves its storage paths the way the scheduler's job store
//! resolves its own.

mod portowner;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{CommanderError, Result};

pub use portowner::find_port_owner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Stopped,
    Managed,
    Attached,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub claude: bool,
    pub gemini: bool,
    pub codex: bool,
}

pub struct ProxySupervisor {
    http: reqwest::Client,
    base_url: String,
    binary_path: String,
    config_path: String,
    port: u16,
    auth_dir: Option<String>,
    child: Mutex<Option<Child>>,
}

impl ProxySupervisor {
    pub fn new(base_url: String, binary_path: String, config_path: String, port: u16, auth_dir: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(CommanderError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            binary_path,
            config_path,
            port,
            auth_dir,
            child: Mutex::new(None),
        })
    }

    pub async fn state(&self) -> SupervisorState {
        if self.child.lock().await.is_some() {
            return SupervisorState::Managed;
        }
        if self.health_check().await.is_some() {
            return SupervisorState::Attached;
        }
        SupervisorState::Stopped
    }

    /// Stops our own child if `force_restart`; kills whoever owns the
    /// configured port if `take_over_existing`; otherwise reuses a
    /// healthy listener already there. Spawns the binary and polls
    /// `/v1/models` with exponential-ish backoff until ready or `timeout`.
    pub async fn start(&self, timeout: Duration, force_restart: bool, take_over_existing: bool) -> Result<SupervisorState> {
        if force_restart {
            self.stop(false).await?;
        }

        if take_over_existing {
            if let Some(pid) = find_port_owner(self.port) {
                info!(pid, port = self.port, "killing existing proxy port owner before takeover start");
                kill_pid(pid);
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        }

        if !force_restart && self.health_check().await.is_some() {
            return Ok(SupervisorState::Attached);
        }

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--config").arg(&self.config_path);
        cmd.stdout(Stdio::null()).stderr(Stdio::null()).stdin(Stdio::null());
        let child = cmd
            .spawn()
            .map_err(|e| CommanderError::Other(anyhow::anyhow!("failed to spawn proxy binary '{}': {e}", self.binary_path)))?;
        *self.child.lock().await = Some(child);

        let deadline = tokio::time::Instant::now() + timeout;
        let mut backoff = Duration::from_millis(100);
        loop {
            if self.health_check().await.is_some() {
                return Ok(SupervisorState::Managed);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CommanderError::Other(anyhow::anyhow!(
                    "proxy did not become healthy within {:?}",
                    timeout
                )));
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(2));
        }
    }

    /// Terminates our child with grace then kill. If `force`, also kills
    /// whoever currently owns the configured port (even if we didn't
    /// spawn it).
    pub async fn stop(&self, force: bool) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Some(pid) = child.id() {
                graceful_terminate(pid as i32);
            }
            match tokio::time::timeout(Duration::from_secs(3), child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    let _ = child.kill().await;
                }
            }
        }
        drop(guard);

        if force {
            if let Some(pid) = find_port_owner(self.port) {
                warn!(pid, port = self.port, "force-killing proxy port owner");
                kill_pid(pid);
            }
        }
        Ok(())
    }

    pub async fn restart(&self, timeout: Duration, force: bool) -> Result<SupervisorState> {
        self.stop(force).await?;
        self.start(timeout, false, force).await
    }

    /// `GET /v1/models`; returns the list of model IDs, or `None` if the
    /// proxy is unreachable or responded with an error.
    pub async fn health_check(&self) -> Option<Vec<String>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.http.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: serde_json::Value = response.json().await.ok()?;
        let ids = body
            .get("data")?
            .as_array()?
            .iter()
            .filter_map(|m| m.get("id").and_then(|id| id.as_str()).map(str::to_string))
            .collect();
        Some(ids)
    }

    /// Buckets model IDs by provider-prefix into a three-boolean map.
    pub async fn get_provider_status(&self) -> ProviderStatus {
        let Some(ids) = self.health_check().await else {
            return ProviderStatus::default();
        };
        let mut status = ProviderStatus::default();
        for id in &ids {
            let lower = id.to_ascii_lowercase();
            if lower.starts_with("claude") {
                status.claude = true;
            } else if lower.starts_with("gemini") {
                status.gemini = true;
            } else if lower.starts_with("gpt-")
                || lower.contains("codex")
                || lower.starts_with("o1-")
                || lower.starts_with("o3-")
                || lower.starts_with("o4-")
            {
                status.codex = true;
            }
        }
        status
    }

    /// Deletes token files under the proxy's auth dir matching a
    /// provider's glob set. Success is "files removed >= 0 and I/O did
    /// not fail" — a missing auth dir is not an error.
    pub async fn disconnect_provider(&self, provider_key: &str) -> Result<usize> {
        let Some(auth_dir) = &self.auth_dir else {
            return Ok(0);
        };
        let patterns = provider_glob_patterns(provider_key);
        let mut removed = 0usize;
        let mut entries = match tokio::fs::read_dir(auth_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CommanderError::Io { path: auth_dir.into(), source: e }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CommanderError::Io { path: auth_dir.into(), source: e })?
        {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if patterns.iter().any(|p| glob_match(p, &name)) {
                if tokio::fs::remove_file(entry.path()).await.is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// Spawns the proxy binary with a provider-specific `--*-login` flag.
    /// Returns the spawned child so the caller can capture stdout for URL
    /// extraction or expose stdin for operator responses.
    pub fn run_login_extended(&self, provider_key: &str, capture_stdout: bool, expose_stdin: bool) -> Result<Child> {
        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--config").arg(&self.config_path);
        cmd.arg(format!("--{provider_key}-login"));
        cmd.stdout(if capture_stdout { Stdio::piped() } else { Stdio::null() });
        cmd.stderr(Stdio::piped());
        cmd.stdin(if expose_stdin { Stdio::piped() } else { Stdio::null() });
        cmd.spawn()
            .map_err(|e| CommanderError::Other(anyhow::anyhow!("failed to spawn login flow for '{provider_key}': {e}")))
    }
}

fn provider_glob_patterns(provider_key: &str) -> Vec<String> {
    match provider_key {
        "claude" => vec!["claude*.json".into(), "anthropic*.json".into()],
        "gemini" => vec!["gemini*.json".into(), "google*.json".into()],
        "codex" => vec!["codex*.json".into(), "openai*.json".into()],
        other => vec![format!("{other}*.json")],
    }
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    match pattern.split_once('*') {
        Some((prefix, suffix)) => candidate.starts_with(prefix) && candidate.ends_with(suffix),
        None => pattern == candidate,
    }
}

#[cfg(unix)]
fn graceful_terminate(pid: i32) {
    let _ = std::process::Command::new("kill").arg("-TERM").arg(pid.to_string()).status();
}

#[cfg(not(unix))]
fn graceful_terminate(_pid: i32) {}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    let _ = std::process::Command::new("kill").arg("-KILL").arg(pid.to_string()).status();
}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) {}

pub type SharedProxySupervisor = Arc<ProxySupervisor>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_match_handles_prefix_star_suffix() {
        assert!(glob_match("claude*.json", "claude-token.json"));
        assert!(!glob_match("claude*.json", "gemini-token.json"));
        assert!(glob_match("exact.json", "exact.json"));
    }

    #[test]
    fn provider_status_buckets_by_prefix() {
        let ids = vec!["claude-3-5-sonnet".to_string(), "gpt-4o-mini".to_string(), "unknown-model".to_string()];
        let mut status = ProviderStatus::default();
        for id in &ids {
            let lower = id.to_ascii_lowercase();
            if lower.starts_with("claude") {
                status.claude = true;
            } else if lower.starts_with("gpt-") {
                status.codex = true;
            }
        }
        assert!(status.claude);
        assert!(status.codex);
        assert!(!status.gemini);
    }
}
