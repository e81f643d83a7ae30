use crate::scheduler::model::ScheduledJob;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsFile {
    pub schema_version: u32,
    pub jobs: Vec<ScheduledJob>,
}

impl Default for JobsFile {
    fn default() -> Self {
        Self {
            schema_version: 1,
            jobs: Vec::new(),
        }
    }
}

pub struct JobStore {
    root_dir: PathBuf,
    jobs_path: PathBuf,
}

impl JobStore {
    pub fn new() -> Result<Self> {
        let root_dir = dirs::data_dir()
            .context("Could not find data directory")?
            .join("agent-commander")
            .join("scheduled_jobs");
        Self::new_in(root_dir)
    }

    pub fn new_in(root_dir: PathBuf) -> Result<Self> {
        let jobs_path = root_dir.join("jobs.json");
        Ok(Self { root_dir, jobs_path })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn jobs_path(&self) -> &Path {
        &self.jobs_path
    }

    pub fn load_jobs(&self) -> Result<JobsFile> {
        if !self.jobs_path.exists() {
            return Ok(JobsFile::default());
        }

        let content = fs::read_to_string(&self.jobs_path)
            .with_context(|| format!("Failed to read jobs file: {:?}", self.jobs_path))?;

        if content.trim().is_empty() {
            return Ok(JobsFile::default());
        }

        let parsed: JobsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse jobs file: {:?}", self.jobs_path))?;

        Ok(parsed)
    }

    pub fn save_jobs(&self, jobs_file: &JobsFile) -> Result<()> {
        fs::create_dir_all(&self.root_dir)
            .with_context(|| format!("Failed to create scheduled jobs dir: {:?}", self.root_dir))?;

        let content = serde_json::to_string_pretty(jobs_file)
            .context("Failed to serialize jobs file")?;

        atomic_write(&self.jobs_path, content.as_bytes()).with_context(|| {
            format!(
                "Failed to atomically write jobs file: {:?}",
                self.jobs_path
            )
        })?;

        Ok(())
    }

    /// Append a job and persist it immediately.
    pub fn add_job(&self, job: ScheduledJob) -> Result<()> {
        let mut jobs_file = self.load_jobs()?;
        jobs_file.jobs.push(job);
        self.save_jobs(&jobs_file)
    }

    /// Drop every job whose action targets the given session channel
    /// (fired when a session/chat is deleted).
    pub fn remove_jobs_by_channel(&self, channel: &str) -> Result<usize> {
        let mut jobs_file = self.load_jobs()?;
        let before = jobs_file.jobs.len();
        jobs_file.jobs.retain(|job| job.target_channel() != Some(channel));
        let removed = before - jobs_file.jobs.len();
        if removed > 0 {
            self.save_jobs(&jobs_file)?;
        }
        Ok(removed)
    }

    /// Startup reconciliation: drop session-targeted jobs whose target
    /// session no longer exists. Jobs with no session target (shell,
    /// agent-task maintenance jobs) are left alone.
    pub fn purge_orphan_jobs(&self, known_sessions: &[String]) -> Result<usize> {
        let mut jobs_file = self.load_jobs()?;
        let before = jobs_file.jobs.len();
        jobs_file.jobs.retain(|job| match job.target_channel() {
            Some(channel) => known_sessions.iter().any(|s| s == channel),
            None => true,
        });
        let removed = before - jobs_file.jobs.len();
        if removed > 0 {
            self.save_jobs(&jobs_file)?;
        }
        Ok(removed)
    }
}

fn atomic_write(dest: &Path, bytes: &[u8]) -> Result<()> {
    let parent = dest
        .parent()
        .context("Destination path has no parent directory")?;
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent dir: {:?}", parent))?;

    let tmp = dest.with_extension(format!("tmp.{}", uuid::Uuid::new_v4()));

    fs::write(&tmp, bytes).with_context(|| format!("Failed to write temp file: {:?}", tmp))?;

    // Best-effort cleanup on failure.
    if let Err(rename_err) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(rename_err).context("Failed to rename temp file into place");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{JobStore, JobsFile};
    use crate::scheduler::model::{
        DurationSpec, IntervalSchedule, JobAction, JobSchedule, JobTimezone, ScheduledJob, ShellAction,
    };
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn unique_temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("agent-commander-test-scheduler-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn jobs_round_trip_save_load() {
        let dir = unique_temp_dir();
        let store = JobStore::new_in(dir.clone()).expect("store");

        let job = ScheduledJob::new_now(
            "defensive-check",
            JobSchedule::Interval(IntervalSchedule {
                every: DurationSpec::from("5m"),
                offset: None,
                timezone: JobTimezone::Local,
            }),
            JobAction::Shell(ShellAction {
                program: "bash".to_string(),
                args: vec!["-lc".to_string(), "echo hello".to_string()],
                cwd: None,
                env: BTreeMap::new(),
                timeout_secs: Some(30),
            }),
        );

        let jf = JobsFile {
            schema_version: 1,
            jobs: vec![job.clone()],
        };

        store.save_jobs(&jf).expect("save");
        let loaded = store.load_jobs().expect("load");
        assert_eq!(loaded.schema_version, 1);
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].id, job.id);
        assert_eq!(loaded.jobs[0].name, job.name);

        // Cleanup
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = unique_temp_dir();
        let store = JobStore::new_in(dir.clone()).expect("store");
        let loaded = store.load_jobs().expect("load");
        assert_eq!(loaded.schema_version, 1);
        assert!(loaded.jobs.is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    fn session_job(name: &str, channel: &str) -> ScheduledJob {
        ScheduledJob::new_now(
            name,
            JobSchedule::Cron(crate::scheduler::model::CronSchedule {
                expression: "0 9 * * *".to_string(),
                timezone: JobTimezone::Utc,
            }),
            JobAction::SessionMessage(crate::scheduler::model::SessionMessageAction {
                channel: channel.to_string(),
                message: "good morning".to_string(),
            }),
        )
    }

    #[test]
    fn remove_jobs_by_channel_drops_matching_jobs_only() {
        let dir = unique_temp_dir();
        let store = JobStore::new_in(dir.clone()).expect("store");
        store.add_job(session_job("morning-a", "chat:a")).unwrap();
        store.add_job(session_job("morning-b", "chat:b")).unwrap();

        let removed = store.remove_jobs_by_channel("chat:a").unwrap();
        assert_eq!(removed, 1);

        let remaining = store.load_jobs().unwrap();
        assert_eq!(remaining.jobs.len(), 1);
        assert_eq!(remaining.jobs[0].name, "morning-b");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn purge_orphan_jobs_keeps_known_sessions_and_non_session_jobs() {
        let dir = unique_temp_dir();
        let store = JobStore::new_in(dir.clone()).expect("store");
        store.add_job(session_job("morning-a", "chat:a")).unwrap();
        store.add_job(session_job("morning-gone", "chat:deleted")).unwrap();
        store
            .add_job(ScheduledJob::new_now(
                "maintenance",
                JobSchedule::Interval(IntervalSchedule {
                    every: DurationSpec::from("1h"),
                    offset: None,
                    timezone: JobTimezone::Utc,
                }),
                JobAction::Shell(ShellAction {
                    program: "true".to_string(),
                    args: vec![],
                    cwd: None,
                    env: BTreeMap::new(),
                    timeout_secs: None,
                }),
            ))
            .unwrap();

        let removed = store.purge_orphan_jobs(&["chat:a".to_string()]).unwrap();
        assert_eq!(removed, 1);

        let remaining = store.load_jobs().unwrap();
        let names: Vec<&str> = remaining.jobs.iter().map(|j| j.name.as_str()).collect();
        assert!(names.contains(&"morning-a"));
        assert!(names.contains(&"maintenance"));
        assert!(!names.contains(&"morning-gone"));
        let _ = std::fs::remove_dir_all(dir);
    }
}

