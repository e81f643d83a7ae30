//! Configuration: a single `config.toml` under the app's config
//! directory, covering transport mode, agent defaults, proxy settings,
//! and the workspace root. A flat document rather than a multi-provider
//! profile store, since this orchestrator wraps exactly three fixed
//! CLIs plus one optional proxy endpoint.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::agentdefs::AgentKind;
use crate::error::{CommanderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Pty,
    ProxyApi,
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Pty
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model_claude: String,
    #[serde(default = "default_model")]
    pub model_gemini: String,
    #[serde(default = "default_model")]
    pub model_codex: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub managed: bool,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

fn default_proxy_base_url() -> String {
    "http://127.0.0.1:8787".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_proxy_port() -> u16 {
    8787
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: default_proxy_base_url(),
            api_key: String::new(),
            model_claude: default_model(),
            model_gemini: default_model(),
            model_codex: default_model(),
            request_timeout_secs: default_request_timeout(),
            managed: false,
            port: default_proxy_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub workspace: PathBuf,
    #[serde(default)]
    pub default_agent: String,
    #[serde(default)]
    pub transport: TransportMode,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            default_agent: AgentKind::Codex.as_str().to_string(),
            transport: TransportMode::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

fn default_workspace() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join("agent-commander-workspace")
}

impl AppConfig {
    pub fn default_agent_kind(&self) -> AgentKind {
        AgentKind::parse(&self.default_agent).unwrap_or(AgentKind::Codex)
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agent-commander")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub async fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::config_path()).await
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        match fs::read_to_string(path).await {
            Ok(raw) => toml::from_str(&raw).map_err(|e| CommanderError::Toml { path: path.to_path_buf(), source: e }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CommanderError::Io { path: path.to_path_buf(), source: e }),
        }
    }

    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CommanderError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let toml_text = toml::to_string_pretty(self).map_err(|e| {
            CommanderError::Other(anyhow::anyhow!("failed to serialize config to toml: {e}"))
        })?;
        fs::write(path, toml_text).await.map_err(|e| CommanderError::Io { path: path.to_path_buf(), source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_yields_default_config() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load_from(&temp.path().join("missing.toml")).await.unwrap();
        assert_eq!(config.default_agent, "codex");
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let mut config = AppConfig::default();
        config.default_agent = "claude".to_string();
        config.proxy.port = 9000;
        config.save_to(&path).await.unwrap();

        let loaded = AppConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded.default_agent, "claude");
        assert_eq!(loaded.proxy.port, 9000);
    }

    #[test]
    fn default_agent_kind_parses_configured_value() {
        let mut config = AppConfig::default();
        config.default_agent = "gemini".to_string();
        assert_eq!(config.default_agent_kind(), AgentKind::Gemini);
    }
}
