//! Session store: per-session JSONL message history plus a session
//! index, persisted with a write-to-tmp-then-rename pattern to avoid
//! torn writes on crash.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{CommanderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub text: String,
    pub ts: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIndexEntry {
    pub session_id: String,
    pub title: String,
    pub agent: String,
    pub workdir: String,
    pub mode: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub messages: Vec<SessionMessage>,
}

pub struct SessionStore {
    root: PathBuf,
    cache: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self { root: root.into(), cache: RwLock::new(HashMap::new()) })
    }

    fn session_path(&self, session_key: &str) -> PathBuf {
        self.root.join(format!("{}.jsonl", sanitize(session_key)))
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    /// Return the cached session, loading it from disk on first access.
    pub async fn get_or_create(&self, session_key: &str) -> Result<SessionRecord> {
        if let Some(record) = self.cache.read().await.get(session_key) {
            return Ok(record.clone());
        }
        let record = self.load_from_disk(session_key).await?;
        self.cache.write().await.insert(session_key.to_string(), record.clone());
        Ok(record)
    }

    pub async fn add_message(&self, session_key: &str, role: &str, text: &str, ts: i64) -> Result<()> {
        let mut cache = self.cache.write().await;
        let record = cache.entry(session_key.to_string()).or_default();
        record.messages.push(SessionMessage { role: role.to_string(), text: text.to_string(), ts });
        let snapshot = record.clone();
        drop(cache);
        self.save(session_key, &snapshot).await
    }

    async fn load_from_disk(&self, session_key: &str) -> Result<SessionRecord> {
        let path = self.session_path(session_key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionRecord::default()),
            Err(e) => return Err(CommanderError::Io { path, source: e }),
        };
        let mut messages = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let message: SessionMessage = serde_json::from_str(line)
                .map_err(|e| CommanderError::Json { path: path.clone(), source: e })?;
            messages.push(message);
        }
        Ok(SessionRecord { messages })
    }

    async fn save(&self, session_key: &str, record: &SessionRecord) -> Result<()> {
        let path = self.session_path(session_key);
        atomic_write_lines(&path, &record.messages).await?;
        self.touch_index(session_key, record).await
    }

    async fn touch_index(&self, session_key: &str, record: &SessionRecord) -> Result<()> {
        let mut entries = self.read_index().await?;
        let updated_at = record.messages.last().map(|m| m.ts).unwrap_or(0);
        let title = record
            .messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.text.chars().take(60).collect())
            .unwrap_or_else(|| session_key.to_string());

        if let Some(existing) = entries.iter_mut().find(|e| e.session_id == session_key) {
            existing.updated_at = updated_at;
            existing.title = title;
        } else {
            entries.push(SessionIndexEntry {
                session_id: session_key.to_string(),
                title,
                agent: String::new(),
                workdir: String::new(),
                mode: String::new(),
                updated_at,
            });
        }
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.write_index(&entries).await
    }

    pub async fn read_index(&self) -> Result<Vec<SessionIndexEntry>> {
        let path = self.index_path();
        match fs::read_to_string(&path).await {
            Ok(raw) => {
                let mut entries: Vec<SessionIndexEntry> = serde_json::from_str(&raw)
                    .map_err(|e| CommanderError::Json { path, source: e })?;
                entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                Ok(entries)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CommanderError::Io { path, source: e }),
        }
    }

    async fn write_index(&self, entries: &[SessionIndexEntry]) -> Result<()> {
        let path = self.index_path();
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| CommanderError::Json { path: path.clone(), source: e })?;
        atomic_write(&path, json.as_bytes()).await
    }
}

fn sanitize(key: &str) -> String {
    key.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' }).collect()
}

async fn atomic_write_lines(path: &Path, messages: &[SessionMessage]) -> Result<()> {
    let mut body = String::new();
    for message in messages {
        let line = serde_json::to_string(message)
            .map_err(|e| CommanderError::Json { path: path.to_path_buf(), source: e })?;
        body.push_str(&line);
        body.push('\n');
    }
    atomic_write(path, body.as_bytes()).await
}

async fn atomic_write(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| CommanderError::Other(anyhow::anyhow!("destination path has no parent: {}", dest.display())))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| CommanderError::Io { path: parent.to_path_buf(), source: e })?;

    let tmp = dest.with_extension(format!("tmp.{}", Uuid::new_v4()));
    fs::write(&tmp, bytes)
        .await
        .map_err(|e| CommanderError::Io { path: tmp.clone(), source: e })?;

    if let Err(e) = fs::rename(&tmp, dest).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(CommanderError::Io { path: dest.to_path_buf(), source: e });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_message_persists_and_reloads() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        store.add_message("cli:direct", "user", "hi", 1).await.unwrap();
        store.add_message("cli:direct", "assistant", "hello", 2).await.unwrap();

        let record = store.get_or_create("cli:direct").await.unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[0].text, "hi");
    }

    #[tokio::test]
    async fn index_sorts_by_most_recently_updated() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        store.add_message("cli:a", "user", "first", 1).await.unwrap();
        store.add_message("cli:b", "user", "second", 5).await.unwrap();

        let index = store.read_index().await.unwrap();
        assert_eq!(index[0].session_id, "cli:b");
        assert_eq!(index[1].session_id, "cli:a");
    }

    #[tokio::test]
    async fn unknown_session_returns_empty_record() {
        let temp = TempDir::new().unwrap();
        let store = SessionStore::new(temp.path());
        let record = store.get_or_create("never:seen").await.unwrap();
        assert!(record.messages.is_empty());
    }
}
