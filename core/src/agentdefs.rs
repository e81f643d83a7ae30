//! Registry of the three wrapped agent CLIs: command name, env override,
//! and the regexes each PTY transport needs to recognize a ready prompt.

use std::env;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Gemini,
    Codex,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Claude => "claude",
            AgentKind::Gemini => "gemini",
            AgentKind::Codex => "codex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Some(AgentKind::Claude),
            "gemini" => Some(AgentKind::Gemini),
            "codex" => Some(AgentKind::Codex),
            _ => None,
        }
    }

    /// Resolve the executable to launch, honoring the per-agent env override.
    pub fn resolve_command(&self) -> String {
        let env_var = match self {
            AgentKind::Claude => "AGENT_COMMANDER_CLAUDE_CMD",
            AgentKind::Gemini => "AGENT_COMMANDER_GEMINI_CMD",
            AgentKind::Codex => "AGENT_COMMANDER_CODEX_CMD",
        };
        env::var(env_var).unwrap_or_else(|_| self.as_str().to_string())
    }

    /// Regexes matching this agent's idle/ready prompt line in its raw PTY output.
    pub fn prompt_patterns(&self) -> &'static [Regex] {
        static CLAUDE: OnceLock<Vec<Regex>> = OnceLock::new();
        static GEMINI: OnceLock<Vec<Regex>> = OnceLock::new();
        static CODEX: OnceLock<Vec<Regex>> = OnceLock::new();

        fn compile(patterns: &[&str]) -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).expect("static prompt pattern must compile"))
                .collect()
        }

        match self {
            AgentKind::Claude => {
                CLAUDE.get_or_init(|| compile(&[r"^\s*>\s*$", r#"Try\s+""#, r"╭─+╮\s*$"]))
            }
            AgentKind::Gemini => {
                GEMINI.get_or_init(|| compile(&[r"^\s*>\s*Type your message", r"^\s*>\s*$"]))
            }
            AgentKind::Codex => {
                CODEX.get_or_init(|| compile(&[r"^\s*▌", r"^\s*›\s*$", r"send\s+message"]))
            }
        }
    }

    pub fn all() -> [AgentKind; 3] {
        [AgentKind::Claude, AgentKind::Gemini, AgentKind::Codex]
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for kind in AgentKind::all() {
            assert_eq!(AgentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AgentKind::parse("not-an-agent"), None);
    }

    #[test]
    fn env_override_wins() {
        std::env::set_var("AGENT_COMMANDER_CLAUDE_CMD", "/opt/bin/claude-beta");
        assert_eq!(AgentKind::Claude.resolve_command(), "/opt/bin/claude-beta");
        std::env::remove_var("AGENT_COMMANDER_CLAUDE_CMD");
        assert_eq!(AgentKind::Claude.resolve_command(), "claude");
    }

    #[test]
    fn prompt_patterns_not_empty() {
        for kind in AgentKind::all() {
            assert!(!kind.prompt_patterns().is_empty());
        }
    }
}
