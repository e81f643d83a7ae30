//! Core library for the agent commander orchestrator.
//!
//! Wraps three third-party coding-agent CLIs (`claude`, `gemini`,
//! `codex`) behind one chat surface, over two interchangeable
//! transports: a PTY session driving the real interactive CLI, or an
//! OpenAI-compatible HTTP proxy with an embedded tool loop.

pub mod agentdefs;
pub mod agentloop;
pub mod agentsession;
pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod httptransport;
pub mod marker;
pub mod memory;
pub mod noise;
pub mod proxysupervisor;
pub mod ptybackend;
pub mod scheduler;
pub mod sessionstore;
pub mod skills;
pub mod termscreen;
pub mod tools;

pub use agentdefs::AgentKind;
pub use agentloop::{AgentLoop, Transport};
pub use agentsession::AgentSession;
pub use bus::{InboundMessage, MessageBus, OutboundMessage};
pub use config::AppConfig;
pub use context::ContextBuilder;
pub use error::{CommanderError, Result};
pub use httptransport::{ProxyTransport, StreamEvent};
pub use memory::MemoryStore;
pub use proxysupervisor::ProxySupervisor;
pub use scheduler::{JobStore, ScheduledJob, SchedulerDaemon};
pub use sessionstore::SessionStore;
pub use skills::SkillsStore;
pub use tools::ToolRegistry;
