use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::bus::{InboundMessage, MessageBus};
use crate::scheduler::cron::CronSchedule as CronMatcher;
use crate::scheduler::model::{JobAction, JobSchedule, ScheduledJob};
use crate::scheduler::store::JobStore;

/// Single ticker, aligned to wall-clock minute boundaries rather than a
/// free-running 60s sleep, so jobs fire on the minute they were scheduled
/// for instead of drifting with daemon uptime.
pub struct SchedulerDaemon {
    store: JobStore,
    pid_path: PathBuf,
    bus: Option<Arc<MessageBus>>,
}

impl SchedulerDaemon {
    pub fn new(store: JobStore) -> Self {
        let pid_path = store.root_dir().join("daemon.pid");
        Self { store, pid_path, bus: None }
    }

    /// Attach the message bus that session-targeted jobs publish onto.
    /// Without a bus, `SessionMessage` jobs are skipped with a warning —
    /// `Shell` jobs still run fine.
    pub fn with_bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Runs one tick immediately, for `agent-commander heartbeat` and tests
    /// that don't want to wait for the minute boundary.
    pub async fn run_once(&self) -> Result<()> {
        self.tick().await
    }

    pub async fn start_loop(&self) -> Result<()> {
        self.write_pid()?;
        info!(pid = process::id(), "scheduler daemon started");

        loop {
            if let Err(e) = self.tick().await {
                error!(error = ?e, "error in daemon tick");
            }
            sleep(time_until_next_minute()).await;
        }
    }

    fn write_pid(&self) -> Result<()> {
        fs::write(&self.pid_path, process::id().to_string())
            .with_context(|| format!("Failed to write PID file: {:?}", self.pid_path))
    }

    pub fn cleanup(&self) {
        if self.pid_path.exists() {
            let _ = fs::remove_file(&self.pid_path);
        }
    }

    async fn tick(&self) -> Result<()> {
        let mut jobs_file = self.store.load_jobs()?;
        let now = Utc::now();
        let mut changed = false;

        for job in jobs_file.jobs.iter_mut() {
            if !job.enabled {
                continue;
            }

            if self.is_due(job, now) {
                info!(job = %job.name, id = %job.id, "executing scheduled job");
                match self.execute_job(job).await {
                    Ok(_) => {
                        job.last_run_at = Some(now);
                        job.next_run_at = self.calculate_next_run(job, now);
                        job.updated_at = now;
                        changed = true;
                    }
                    Err(e) => {
                        warn!(job = %job.name, error = ?e, "failed to execute scheduled job");
                    }
                }
            }
        }

        if changed {
            self.store.save_jobs(&jobs_file)?;
        }

        Ok(())
    }

    fn is_due(&self, job: &ScheduledJob, now: DateTime<Utc>) -> bool {
        match job.next_run_at {
            Some(next) => now >= next,
            None => match &job.schedule {
                JobSchedule::Cron(cron) => CronMatcher::parse(&cron.expression)
                    .map(|m| m.matches(now))
                    .unwrap_or(false),
                JobSchedule::Interval(_) => true,
            },
        }
    }

    fn calculate_next_run(&self, job: &ScheduledJob, last_run: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &job.schedule {
            JobSchedule::Interval(interval) => {
                let duration = self.parse_duration(&interval.every.raw).ok()?;
                Some(last_run + chrono::Duration::from_std(duration).ok()?)
            }
            JobSchedule::Cron(cron) => {
                let matcher = CronMatcher::parse(&cron.expression).ok()?;
                matcher.next_after(last_run)
            }
        }
    }

    async fn execute_job(&self, job: &ScheduledJob) -> Result<()> {
        match &job.action {
            JobAction::Shell(shell) => {
                let mut cmd = tokio::process::Command::new(&shell.program);
                cmd.args(&shell.args);

                if let Some(cwd) = &shell.cwd {
                    cmd.current_dir(cwd);
                }

                for (k, v) in &shell.env {
                    cmd.env(k, v);
                }

                let output = cmd.output().await?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    anyhow::bail!("Command failed with status {}: {}", output.status, stderr);
                }
                Ok(())
            }
            JobAction::SessionMessage(action) => {
                let Some(bus) = &self.bus else {
                    anyhow::bail!("scheduler has no message bus attached, cannot fire session message job");
                };
                let mut metadata = serde_json::Map::new();
                metadata.insert("sender_id".into(), serde_json::json!("system"));
                metadata.insert("chat_id".into(), serde_json::json!(action.channel));
                metadata.insert("scheduled".into(), serde_json::json!(true));
                bus.publish_inbound(InboundMessage {
                    channel: action.channel.clone(),
                    text: action.message.clone(),
                    metadata,
                })
                .await
                .map_err(|e| anyhow::anyhow!("failed to publish scheduled inbound: {e}"))
            }
        }
    }

    fn parse_duration(&self, raw: &str) -> Result<Duration> {
        let (num_str, unit) = raw.split_at(raw.len() - 1);
        let num: u64 = num_str.parse().context("Invalid duration number")?;
        match unit {
            "s" => Ok(Duration::from_secs(num)),
            "m" => Ok(Duration::from_secs(num * 60)),
            "h" => Ok(Duration::from_secs(num * 3600)),
            "d" => Ok(Duration::from_secs(num * 86400)),
            _ => anyhow::bail!("Invalid duration unit: {}", unit),
        }
    }
}

fn time_until_next_minute() -> Duration {
    let now = Utc::now();
    let seconds_into_minute = now.timestamp() % 60;
    let remainder = 60 - seconds_into_minute;
    Duration::from_secs(remainder.max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::model::{CronSchedule, JobTimezone, SessionMessageAction};
    use std::path::PathBuf as StdPathBuf;

    fn unique_temp_dir() -> StdPathBuf {
        std::env::temp_dir().join(format!("agent-commander-test-scheduler-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn session_message_job_without_bus_errors() {
        let dir = unique_temp_dir();
        let store = JobStore::new_in(dir.clone()).unwrap();
        let daemon = SchedulerDaemon::new(store);
        let job = ScheduledJob::new_now(
            "reminder",
            JobSchedule::Cron(CronSchedule { expression: "* * * * *".to_string(), timezone: JobTimezone::Utc }),
            JobAction::SessionMessage(SessionMessageAction { channel: "chat:a".into(), message: "hi".into() }),
        );
        assert!(daemon.execute_job(&job).await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn session_message_job_publishes_inbound_via_bus() {
        let dir = unique_temp_dir();
        let store = JobStore::new_in(dir.clone()).unwrap();
        let bus = MessageBus::new();
        let daemon = SchedulerDaemon::new(store).with_bus(Arc::clone(&bus));
        let job = ScheduledJob::new_now(
            "reminder",
            JobSchedule::Cron(CronSchedule { expression: "* * * * *".to_string(), timezone: JobTimezone::Utc }),
            JobAction::SessionMessage(SessionMessageAction { channel: "chat:a".into(), message: "hi".into() }),
        );
        daemon.execute_job(&job).await.unwrap();
        let received = bus.recv_inbound().await.unwrap();
        assert_eq!(received.channel, "chat:a");
        assert_eq!(received.text, "hi");
        let _ = std::fs::remove_dir_all(dir);
    }
}
