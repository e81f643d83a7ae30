//! shell tool, adapted from the blocklist/timeout/truncation pattern in
//! the capability-graph shell executor into the flat dispatch contract.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

use crate::error::Result;
use crate::tools::Tool;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_OUTPUT_SIZE: usize = 100_000;

const BLOCKED_COMMANDS: &[&str] = &["rm -rf /", "> /dev/sda", "dd if=/dev/zero"];

pub struct ShellTool;

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &'static str {
        "shell"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "shell",
            "description": "Run a shell command and return its combined stdout/stderr output.",
            "parameters": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "timeout_secs": {"type": "integer", "description": "Optional override, default 30s."}
                },
                "required": ["command"]
            }
        })
    }

    async fn call(&self, args: &Value, cwd: Option<&str>) -> Result<String> {
        let Some(command) = args.get("command").and_then(|v| v.as_str()).or_else(|| args.as_str()) else {
            return Ok("Error: missing 'command'".to_string());
        };
        let command = command.to_string();

        let lowered = command.to_lowercase();
        if BLOCKED_COMMANDS.iter().any(|blocked| lowered.contains(blocked)) {
            return Ok(format!("Error: command blocked for safety: {command}"));
        }

        let timeout_secs = args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        match timeout(Duration::from_secs(timeout_secs), run_command(&command, cwd)).await {
            Ok(result) => result,
            Err(_) => Ok(format!("Error: command timed out after {timeout_secs}s")),
        }
    }
}

async fn run_command(command: &str, cwd: Option<&str>) -> Result<String> {
    let mut cmd = if cfg!(target_os = "windows") {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = match cmd.output().await {
        Ok(o) => o,
        Err(e) => return Ok(format!("Error: {e}")),
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str("[stderr]:\n");
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
    }
    if combined.len() > MAX_OUTPUT_SIZE {
        combined.truncate(MAX_OUTPUT_SIZE);
        combined.push_str("\n... [output truncated]");
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shell_echo_returns_output() {
        let tool = ShellTool;
        let out = tool.call(&json!({"command": "echo hello"}), None).await.unwrap();
        assert!(out.contains("hello"));
    }

    #[tokio::test]
    async fn shell_blocked_command_errors() {
        let tool = ShellTool;
        let out = tool.call(&json!({"command": "rm -rf /"}), None).await.unwrap();
        assert!(out.starts_with("Error: "));
    }

    #[tokio::test]
    async fn shell_accepts_bare_string_args() {
        let tool = ShellTool;
        let out = tool.call(&json!("echo bare"), None).await.unwrap();
        assert!(out.contains("bare"));
    }
}
