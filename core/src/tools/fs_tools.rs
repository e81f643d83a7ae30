//! read_file / write_file / list_directory tool implementations, adapted
//! from the capability-graph fs tools into the flat dispatch contract.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tools::Tool;

const MAX_FILE_SIZE: u64 = 10_000_000;

fn resolve_path(raw: &str, cwd: Option<&str>) -> std::path::PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match cwd {
        Some(dir) => Path::new(dir).join(path),
        None => path.to_path_buf(),
    }
}

fn arg_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "read_file",
            "description": "Read the contents of a text file.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "File path, absolute or relative to the workspace."}
                },
                "required": ["path"]
            }
        })
    }

    async fn call(&self, args: &Value, cwd: Option<&str>) -> Result<String> {
        let Some(raw) = arg_str(args, "path") else {
            return Ok("Error: missing 'path'".to_string());
        };
        let path = resolve_path(&raw, cwd);

        if path.is_dir() {
            return Ok(format!("Error: '{}' is a directory, not a file", path.display()));
        }

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(e) => return Ok(format!("Error: {}: {e}", path.display())),
        };
        if metadata.len() > MAX_FILE_SIZE {
            return Ok(format!("Error: file too large: {} bytes (max {MAX_FILE_SIZE})", metadata.len()));
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) => Ok(format!("Error: {}: {e}", path.display())),
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "write_file",
            "description": "Write text content to a file, creating parent directories as needed.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }
        })
    }

    async fn call(&self, args: &Value, cwd: Option<&str>) -> Result<String> {
        let Some(raw) = arg_str(args, "path") else {
            return Ok("Error: missing 'path'".to_string());
        };
        let Some(content) = arg_str(args, "content") else {
            return Ok("Error: missing 'content'".to_string());
        };
        let path = resolve_path(&raw, cwd);

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(format!("Error: {}: {e}", parent.display()));
            }
        }

        if let Err(e) = tokio::fs::write(&path, &content).await {
            return Ok(format!("Error: {}: {e}", path.display()));
        }

        Ok(format!("wrote {} bytes to {}", content.len(), path.display()))
    }
}

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "list_directory",
            "description": "List entries in a directory, one per line.",
            "parameters": {
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Directory path; defaults to the working directory."}
                }
            }
        })
    }

    async fn call(&self, args: &Value, cwd: Option<&str>) -> Result<String> {
        let raw = arg_str(args, "path").unwrap_or_else(|| ".".to_string());
        let path = resolve_path(&raw, cwd);

        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(e) => e,
            Err(e) => return Ok(format!("Error: {}: {e}", path.display())),
        };

        let mut names = Vec::new();
        while let Some(entry) = match entries.next_entry().await {
            Ok(e) => e,
            Err(e) => return Ok(format!("Error: {}: {e}", path.display())),
        } {
            let file_type = entry.file_type().await.ok();
            let suffix = match file_type {
                Some(ft) if ft.is_dir() => "/",
                _ => "",
            };
            names.push(format!("{}{suffix}", entry.file_name().to_string_lossy()));
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_file_round_trips_write() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("note.txt");
        let write = WriteFileTool;
        write
            .call(&json!({"path": file_path.to_str().unwrap(), "content": "hello"}), None)
            .await
            .unwrap();

        let read = ReadFileTool;
        let out = read.call(&json!({"path": file_path.to_str().unwrap()}), None).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn read_file_rejects_directory() {
        let temp = TempDir::new().unwrap();
        let read = ReadFileTool;
        let out = read.call(&json!({"path": temp.path().to_str().unwrap()}), None).await.unwrap();
        assert!(out.starts_with("Error: "));
    }

    #[tokio::test]
    async fn list_directory_includes_written_file() {
        let temp = TempDir::new().unwrap();
        tokio::fs::write(temp.path().join("a.txt"), "x").await.unwrap();
        let list = ListDirectoryTool;
        let out = list.call(&json!({"path": temp.path().to_str().unwrap()}), None).await.unwrap();
        assert!(out.contains("a.txt"));
    }
}
