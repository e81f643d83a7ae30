//! Tool registry: declares the built-in tools as OpenAI-style
//! function schemas and dispatches `execute_tool(name, args_json, cwd)`
//! the way the embedded tool loop expects.

mod fs_tools;
mod shell;
mod web_fetch;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CommanderError, Result};

const MAX_TOOL_OUTPUT: usize = 32_000;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn schema(&self) -> Value;
    async fn call(&self, args: &Value, cwd: Option<&str>) -> Result<String>;
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn with_defaults() -> Self {
        Self {
            tools: vec![
                Box::new(fs_tools::ReadFileTool),
                Box::new(fs_tools::WriteFileTool),
                Box::new(fs_tools::ListDirectoryTool),
                Box::new(shell::ShellTool),
                Box::new(web_fetch::WebFetchTool::new()),
            ],
        }
    }

    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": t.schema(),
                })
            })
            .collect()
    }

    pub async fn dispatch(&self, name: &str, arguments_json: &str, cwd: Option<&str>) -> Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| CommanderError::ToolNotFound(name.to_string()))?;

        let args: Value = if arguments_json.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(arguments_json)
                .unwrap_or_else(|_| Value::String(arguments_json.to_string()))
        };

        let result = tool.call(&args, cwd).await?;
        Ok(truncate(&result))
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_TOOL_OUTPUT {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(MAX_TOOL_OUTPUT).collect();
    truncated.push_str("\n... [output truncated]");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = ToolRegistry::with_defaults();
        let result = registry.dispatch("does_not_exist", "{}", None).await;
        assert!(result.is_err());
    }

    #[test]
    fn truncate_respects_cap() {
        let long = "a".repeat(MAX_TOOL_OUTPUT + 500);
        let out = truncate(&long);
        assert!(out.len() < long.len());
        assert!(out.ends_with("[output truncated]"));
    }

    #[test]
    fn definitions_include_all_tools() {
        let registry = ToolRegistry::with_defaults();
        assert_eq!(registry.definitions().len(), 5);
    }
}
