//! Context builder: assembles the system prompt and per-turn
//! prompt handed to a wrapped CLI agent or the proxy transport —
//! identity section, bootstrap files, memory, skills, session facts,
//! and compact history.

use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::Result;
use crate::memory::MemoryStore;
use crate::sessionstore::SessionMessage;
use crate::skills::SkillsStore;

const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];
const MAX_HISTORY_MESSAGES: usize = 30;

pub struct ContextBuilder {
    workspace: PathBuf,
    memory: MemoryStore,
    skills: SkillsStore,
}

impl ContextBuilder {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            memory: MemoryStore::new(&workspace),
            skills: SkillsStore::new(&workspace),
            workspace,
        }
    }

    pub async fn build_system_prompt(&self) -> Result<String> {
        let mut parts = vec![self.identity_section()];

        let bootstrap = self.load_bootstrap_files().await;
        if !bootstrap.is_empty() {
            parts.push(bootstrap);
        }

        let memory = self.memory.get_memory_context().await?;
        if !memory.is_empty() {
            parts.push(format!("# Memory\n\n{memory}"));
        }

        let always_on = self.skills.always_on().await?;
        if !always_on.is_empty() {
            let joined: Vec<String> = always_on
                .iter()
                .map(|s| format!("## {}\n\n{}", s.meta.name, s.content))
                .collect();
            parts.push(format!("# Active Skills\n\n{}", joined.join("\n\n---\n\n")));
        }

        let summary = self.skills.build_summary().await?;
        if !summary.is_empty() {
            parts.push(format!(
                "# Skills\n\nThe following skills extend your capabilities. To use a skill, \
                 read its SKILL.md file using the read_file tool.\n\n{summary}"
            ));
        }

        Ok(parts.join("\n\n---\n\n"))
    }

    pub async fn build_cli_turn_prompt(
        &self,
        history: &[SessionMessage],
        current_message: &str,
        channel: Option<&str>,
        chat_id: Option<&str>,
        cwd: Option<&str>,
    ) -> Result<String> {
        let mut sections = Vec::new();

        let system_prompt = self.build_system_prompt().await?;
        sections.push(format!("# System Context\n{system_prompt}"));

        let mut session_rows = Vec::new();
        if let (Some(channel), Some(chat_id)) = (channel, chat_id) {
            session_rows.push(format!("Channel: {channel}"));
            session_rows.push(format!("Chat ID: {chat_id}"));
        }
        if let Some(cwd) = cwd {
            session_rows.push(format!("Working Directory: {cwd}"));
            session_rows.push(
                "Tooling note: default all filesystem/shell operations to this directory. \
                 Do not set tool `cwd` explicitly unless the user asks for another path."
                    .to_string(),
            );
        }
        if !session_rows.is_empty() {
            sections.push(format!("# Session\n{}", session_rows.join("\n")));
        }

        let history_text = format_history(history);
        if !history_text.is_empty() {
            sections.push(format!("# Conversation History\n{history_text}"));
        }

        sections.push(format!("# Current User Message\n{current_message}"));
        sections.push("Respond only with your assistant answer.".to_string());

        Ok(sections.join("\n\n"))
    }

    fn identity_section(&self) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        let workspace_path = self.workspace.display();
        let os = std::env::consts::OS;
        let arch = std::env::consts::ARCH;

        format!(
            "# agent-commander\n\n\
             You are Agent Commander, running in desktop GUI mode.\n\
             You interact through a CLI coding agent session (Claude Code, Gemini CLI, or Codex CLI).\n\
             The CLI agent controls its own tool usage and reasoning loop.\n\n\
             ## Current Time\n{now}\n\n\
             ## Runtime\n{os} {arch}\n\n\
             ## Workspace\n\
             Your workspace is at: {workspace_path}\n\
             - Memory files: {workspace_path}/memory/MEMORY.md\n\
             - Daily notes: {workspace_path}/memory/YYYY-MM-DD.md\n\
             - Custom skills: {workspace_path}/skills/{{skill-name}}/SKILL.md\n\
             The workspace is your project root, but the active chat working directory can differ.\n\
             When `# Session` includes `Working Directory`, treat that as the default location for tool calls.\n\n\
             When responding, return the direct final assistant text.\n\
             Do not output internal transport wrappers, channel commands, or tool schema blocks unless the user asks.\n\n\
             Always be helpful, accurate, and concise.\n\
             When remembering something, write to {workspace_path}/memory/MEMORY.md"
        )
    }

    async fn load_bootstrap_files(&self) -> String {
        let mut parts = Vec::new();
        for filename in BOOTSTRAP_FILES {
            let path = self.workspace.join(filename);
            if let Ok(content) = tokio::fs::read_to_string(&path).await {
                parts.push(format!("## {filename}\n\n{content}"));
            }
        }
        parts.join("\n\n")
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

fn format_history(history: &[SessionMessage]) -> String {
    let start = history.len().saturating_sub(MAX_HISTORY_MESSAGES);
    history[start..]
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| format!("{}: {}", m.role.to_uppercase(), m.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn system_prompt_includes_identity_and_workspace_path() {
        let temp = TempDir::new().unwrap();
        let builder = ContextBuilder::new(temp.path());
        let prompt = builder.build_system_prompt().await.unwrap();
        assert!(prompt.contains("Agent Commander"));
        assert!(prompt.contains(&temp.path().display().to_string()));
    }

    #[tokio::test]
    async fn system_prompt_includes_bootstrap_file_content() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("SOUL.md"), "Be concise.").await.unwrap();
        let builder = ContextBuilder::new(temp.path());
        let prompt = builder.build_system_prompt().await.unwrap();
        assert!(prompt.contains("Be concise."));
    }

    #[tokio::test]
    async fn turn_prompt_includes_history_and_current_message() {
        let temp = TempDir::new().unwrap();
        let builder = ContextBuilder::new(temp.path());
        let history = vec![
            SessionMessage { role: "user".into(), text: "hi".into(), ts: 0 },
            SessionMessage { role: "assistant".into(), text: "hello".into(), ts: 1 },
        ];
        let prompt = builder
            .build_cli_turn_prompt(&history, "what now?", Some("cli"), Some("direct"), Some("/tmp"))
            .await
            .unwrap();
        assert!(prompt.contains("USER: hi"));
        assert!(prompt.contains("ASSISTANT: hello"));
        assert!(prompt.contains("what now?"));
        assert!(prompt.contains("Working Directory: /tmp"));
    }
}
