//! Flat-file memory store: a persistent `MEMORY.md` plus daily notes
//! under `{workspace}/memory/YYYY-MM-DD.md`, appended to rather than
//! rewritten, injected into the turn context by the context builder.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs;

use crate::error::{CommanderError, Result};

pub struct MemoryStore {
    root: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self { root: workspace.as_ref().join("memory") }
    }

    fn memory_md_path(&self) -> PathBuf {
        self.root.join("MEMORY.md")
    }

    fn daily_note_path(&self) -> PathBuf {
        self.root.join(format!("{}.md", Local::now().format("%Y-%m-%d")))
    }

    /// Combined context block: `MEMORY.md` followed by today's daily
    /// note, if either has content. Empty string if there's nothing to
    /// inject.
    pub async fn get_memory_context(&self) -> Result<String> {
        let mut parts = Vec::new();
        if let Some(content) = self.read_if_exists(&self.memory_md_path()).await? {
            if !content.trim().is_empty() {
                parts.push(content);
            }
        }
        if let Some(content) = self.read_if_exists(&self.daily_note_path()).await? {
            if !content.trim().is_empty() {
                parts.push(format!("## Today\n\n{content}"));
            }
        }
        Ok(parts.join("\n\n"))
    }

    pub async fn append_to_memory(&self, text: &str) -> Result<()> {
        self.append(&self.memory_md_path(), text).await
    }

    pub async fn append_daily_note(&self, text: &str) -> Result<()> {
        self.append(&self.daily_note_path(), text).await
    }

    async fn read_if_exists(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CommanderError::Io { path: path.to_path_buf(), source: e }),
        }
    }

    async fn append(&self, path: &Path, text: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CommanderError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let mut existing = self.read_if_exists(path).await?.unwrap_or_default();
        if !existing.is_empty() && !existing.ends_with('\n') {
            existing.push('\n');
        }
        existing.push_str(text.trim_end());
        existing.push('\n');
        fs::write(path, existing)
            .await
            .map_err(|e| CommanderError::Io { path: path.to_path_buf(), source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_and_reads_memory_md() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store.append_to_memory("user prefers dark mode").await.unwrap();
        store.append_to_memory("user is a Rust engineer").await.unwrap();
        let context = store.get_memory_context().await.unwrap();
        assert!(context.contains("dark mode"));
        assert!(context.contains("Rust engineer"));
    }

    #[tokio::test]
    async fn empty_store_returns_empty_context() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        assert_eq!(store.get_memory_context().await.unwrap(), "");
    }

    #[tokio::test]
    async fn daily_note_appears_under_today_heading() {
        let temp = TempDir::new().unwrap();
        let store = MemoryStore::new(temp.path());
        store.append_daily_note("shipped the release").await.unwrap();
        let context = store.get_memory_context().await.unwrap();
        assert!(context.contains("## Today"));
        assert!(context.contains("shipped the release"));
    }
}
