//! Skills store: one directory per skill under `{workspace}/skills/{name}/`,
//! holding `skill.json` metadata and an optional `SKILL.md` body.
//! Directory-per-entity plus metadata-plus-content file mirrors the
//! layout used for scheduler job files and session files elsewhere in
//! this crate.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{CommanderError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub always_on: bool,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

pub struct Skill {
    pub meta: SkillMeta,
    pub content: String,
}

pub struct SkillsStore {
    root: PathBuf,
}

impl SkillsStore {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self { root: workspace.as_ref().join("skills") }
    }

    pub async fn list(&self) -> Result<Vec<SkillMeta>> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CommanderError::Io { path: self.root.clone(), source: e }),
        };

        let mut skills = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CommanderError::Io { path: self.root.clone(), source: e })?
        {
            if !entry.file_type().await.map(|ft| ft.is_dir()).unwrap_or(false) {
                continue;
            }
            if let Some(meta) = self.read_meta(&entry.path()).await? {
                skills.push(meta);
            }
        }
        skills.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(skills)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Skill>> {
        let dir = self.root.join(name);
        let Some(meta) = self.read_meta(&dir).await? else {
            return Ok(None);
        };
        let content = self.read_content(&dir).await?;
        Ok(Some(Skill { meta, content }))
    }

    pub async fn save(&self, meta: &SkillMeta, content: &str) -> Result<()> {
        let dir = self.root.join(&meta.name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| CommanderError::Io { path: dir.clone(), source: e })?;
        let meta_json = serde_json::to_string_pretty(meta)
            .map_err(|e| CommanderError::Json { path: dir.join("skill.json"), source: e })?;
        fs::write(dir.join("skill.json"), meta_json)
            .await
            .map_err(|e| CommanderError::Io { path: dir.join("skill.json"), source: e })?;
        fs::write(dir.join("SKILL.md"), content)
            .await
            .map_err(|e| CommanderError::Io { path: dir.join("SKILL.md"), source: e })?;
        Ok(())
    }

    /// Skills flagged `always_on`: their content is always injected in full.
    pub async fn always_on(&self) -> Result<Vec<Skill>> {
        let mut skills = Vec::new();
        for meta in self.list().await? {
            if meta.always_on {
                if let Some(skill) = self.get(&meta.name).await? {
                    skills.push(skill);
                }
            }
        }
        Ok(skills)
    }

    /// A one-line-per-skill summary for skills that are not always-on,
    /// so the agent can `read_file` the full `SKILL.md` on demand.
    pub async fn build_summary(&self) -> Result<String> {
        let lines: Vec<String> = self
            .list()
            .await?
            .into_iter()
            .filter(|m| !m.always_on)
            .map(|m| format!("- {} (available={}): {}", m.name, m.available, m.description))
            .collect();
        Ok(lines.join("\n"))
    }

    async fn read_meta(&self, dir: &Path) -> Result<Option<SkillMeta>> {
        let meta_path = dir.join("skill.json");
        match fs::read_to_string(&meta_path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| CommanderError::Json { path: meta_path, source: e }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CommanderError::Io { path: meta_path, source: e }),
        }
    }

    async fn read_content(&self, dir: &Path) -> Result<String> {
        match fs::read_to_string(dir.join("SKILL.md")).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(CommanderError::Io { path: dir.join("SKILL.md"), source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_and_list_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = SkillsStore::new(temp.path());
        store
            .save(
                &SkillMeta { name: "rust-reviewer".into(), description: "reviews rust PRs".into(), always_on: false, available: true },
                "# Rust Reviewer\n\nReview diffs for idiomatic style.",
            )
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "rust-reviewer");

        let fetched = store.get("rust-reviewer").await.unwrap().unwrap();
        assert!(fetched.content.contains("Rust Reviewer"));
    }

    #[tokio::test]
    async fn always_on_skills_are_separated_from_summary() {
        let temp = TempDir::new().unwrap();
        let store = SkillsStore::new(temp.path());
        store
            .save(&SkillMeta { name: "core".into(), description: "core behavior".into(), always_on: true, available: true }, "always present")
            .await
            .unwrap();
        store
            .save(&SkillMeta { name: "optional".into(), description: "optional behavior".into(), always_on: false, available: true }, "on demand")
            .await
            .unwrap();

        let always = store.always_on().await.unwrap();
        assert_eq!(always.len(), 1);
        assert_eq!(always[0].meta.name, "core");

        let summary = store.build_summary().await.unwrap();
        assert!(summary.contains("optional"));
        assert!(!summary.contains("core (available"));
    }

    #[tokio::test]
    async fn missing_skills_dir_lists_empty() {
        let temp = TempDir::new().unwrap();
        let store = SkillsStore::new(temp.path().join("nonexistent"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
