//! Structured error types for the agent commander core.
//!
//! Covers transport failures talking to a wrapped CLI or the proxy,
//! process lifecycle failures, and persistence failures. Tool-level
//! failures are not represented here — a tool call either succeeds or
//! returns an `"Error: ..."` string the model can read, never a `Result::Err`.
//! Everything else passes through `anyhow` at the call site.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommanderError {
    // =========================================================================
    // Transport errors (PTY sessions, HTTP streaming)
    // =========================================================================
    #[error("agent process exited unexpectedly (agent: {agent}, code: {code:?})")]
    ProcessExited { agent: String, code: Option<i32> },

    #[error("turn timed out after {seconds}s waiting for {agent}")]
    TurnTimeout { agent: String, seconds: u64 },

    #[error("pty error: {0}")]
    Pty(String),

    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("proxy returned no usable content after {rounds} tool round(s)")]
    ProxyExhausted { rounds: u32 },

    #[error("unrecognized agent key: {0}")]
    UnknownAgent(String),

    // =========================================================================
    // Tool errors
    // =========================================================================
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    // =========================================================================
    // Persistence errors (session store, scheduler store)
    // =========================================================================
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse toml at {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    // =========================================================================
    // Scheduler errors
    // =========================================================================
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("job not found: {0}")]
    JobNotFound(String),

    // =========================================================================
    // Catch-all
    // =========================================================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CommanderError>;
