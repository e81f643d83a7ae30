//! Agent loop: the dispatcher that turns one inbound message into a
//! CLI-agent or proxy-API turn and republishes the result as an
//! outbound message, plus loop mode's stop-sentinel-gated
//! auto-continuation.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::agentdefs::AgentKind;
use crate::agentsession::AgentSession;
use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::context::ContextBuilder;
use crate::error::{CommanderError, Result};
use crate::httptransport::{ProxyTransport, StreamEvent};
use crate::marker;
use crate::noise;
use crate::sessionstore::SessionStore;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(200);
const STREAM_CADENCE: Duration = Duration::from_secs(1);
const INBOUND_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Fan-out callback for streamed chat text and tool-event notices.
pub type TextSink = Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
/// Fan-out callback for raw PTY bytes (terminal view sink, PTY mode only).
pub type RawSink = Box<dyn Fn(Vec<u8>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub enum Transport {
    /// Drives the real CLI under a PTY, one persistent session per chat.
    Pty,
    /// Talks to an OpenAI-compatible proxy; stateless per turn.
    ProxyApi(Arc<ProxyTransport>),
}

pub struct AgentLoop {
    bus: Arc<MessageBus>,
    workspace: PathBuf,
    default_agent: AgentKind,
    transport: Transport,
    context: ContextBuilder,
    sessions: Arc<SessionStore>,
    agent_sessions: RwLock<HashMap<String, Arc<AgentSession>>>,
    running: AtomicBool,
    stream_sinks: Mutex<Vec<TextSink>>,
    terminal_sinks: Mutex<Vec<RawSink>>,
    tool_sinks: Mutex<Vec<TextSink>>,
}

impl AgentLoop {
    pub fn new(
        bus: Arc<MessageBus>,
        workspace: PathBuf,
        default_agent: AgentKind,
        transport: Transport,
    ) -> Self {
        let sessions = SessionStore::new(workspace.join("sessions"));
        Self {
            context: ContextBuilder::new(&workspace),
            workspace,
            default_agent,
            transport,
            sessions,
            agent_sessions: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            stream_sinks: Mutex::new(Vec::new()),
            terminal_sinks: Mutex::new(Vec::new()),
            tool_sinks: Mutex::new(Vec::new()),
            bus,
        }
    }

    /// Register a sink for streamed chat-bubble text, invoked with each
    /// new delta as a turn progresses.
    pub async fn on_stream_chunk(&self, sink: TextSink) {
        self.stream_sinks.lock().await.push(sink);
    }

    /// Register a sink for raw PTY bytes (terminal-view mirroring, PTY
    /// transport only).
    pub async fn on_terminal_bytes(&self, sink: RawSink) {
        self.terminal_sinks.lock().await.push(sink);
    }

    /// Register a sink for tool invocation/result notices (HTTP
    /// transport only).
    pub async fn on_tool_event(&self, sink: TextSink) {
        self.tool_sinks.lock().await.push(sink);
    }

    async fn emit_stream_chunk(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let sinks = self.stream_sinks.lock().await;
        for sink in sinks.iter() {
            sink(text.to_string()).await;
        }
    }

    async fn emit_terminal_bytes(&self, bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        let sinks = self.terminal_sinks.lock().await;
        for sink in sinks.iter() {
            sink(bytes.clone()).await;
        }
    }

    async fn emit_tool_event(&self, text: &str) {
        let sinks = self.tool_sinks.lock().await;
        for sink in sinks.iter() {
            sink(text.to_string()).await;
        }
    }

    pub async fn run(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        info!("agent loop started");

        while self.running.load(Ordering::SeqCst) {
            let msg = match tokio::time::timeout(INBOUND_POLL_TIMEOUT, self.bus.recv_inbound()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(_) => continue,
            };

            match self.process_message(&msg).await {
                Ok(Some(response)) => {
                    let loop_mode = response
                        .metadata
                        .get("loop_mode")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let loop_stop = response
                        .metadata
                        .get("loop_stop")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let should_continue = loop_mode && !loop_stop && !detect_stop_signal(&response.text);

                    if let Err(e) = self.bus.publish_outbound(response.clone()).await {
                        error!(error = %e, "failed to publish outbound message");
                    }

                    if should_continue {
                        let mut metadata = response.metadata.clone();
                        metadata.insert("auto_loop".into(), serde_json::json!(true));
                        let continuation = InboundMessage {
                            channel: msg.channel.clone(),
                            text: build_loop_continuation_prompt(),
                            metadata,
                        };
                        if let Err(e) = self.bus.publish_inbound(continuation).await {
                            error!(error = %e, "failed to publish loop continuation");
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "error processing inbound message");
                    let _ = self
                        .bus
                        .publish_outbound(OutboundMessage {
                            channel: msg.channel.clone(),
                            text: format!("Sorry, I encountered an error: {e}"),
                            metadata: serde_json::Map::new(),
                        })
                        .await;
                }
            }
        }
        info!("agent loop stopping");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn process_message(self: &Arc<Self>, msg: &InboundMessage) -> Result<Option<OutboundMessage>> {
        let session_key = msg.channel.clone();
        debug!(session_key, "processing inbound message");

        let agent = msg
            .metadata
            .get("agent")
            .and_then(|v| v.as_str())
            .and_then(AgentKind::parse)
            .unwrap_or(self.default_agent);
        let cwd = msg
            .metadata
            .get("cwd")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.workspace.display().to_string());

        match &self.transport {
            Transport::ProxyApi(proxy) => {
                self.run_turn_proxy(msg, &session_key, agent, cwd, Arc::clone(proxy)).await.map(Some)
            }
            Transport::Pty if agent == AgentKind::Gemini => {
                self.run_turn_gemini_noninteractive(msg, &session_key, cwd).await.map(Some)
            }
            Transport::Pty => {
                let session = self.get_or_create_agent_session(&session_key, agent, cwd.clone()).await?;
                session.wait_until_ready(STARTUP_TIMEOUT).await;
                self.run_turn_pty(msg, &session_key, session).await.map(Some)
            }
        }
    }

    async fn run_turn_pty(
        &self,
        msg: &InboundMessage,
        session_key: &str,
        session: Arc<AgentSession>,
    ) -> Result<OutboundMessage> {
        let record = self.sessions.get_or_create(session_key).await?;
        let cwd = msg.metadata.get("cwd").and_then(|v| v.as_str()).map(str::to_string);
        let prompt = self
            .context
            .build_cli_turn_prompt(&record.messages, &msg.text, Some(&msg.channel), Some(session_key), cwd.as_deref())
            .await?;

        session.prepare_for_response(true);
        session.submit(&prompt)?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(180);
        let mut last_streamed = String::new();
        let mut last_stream_tick = tokio::time::Instant::now();
        loop {
            for raw in session.read_available_raw(64) {
                self.emit_terminal_bytes(raw).await;
            }

            if last_stream_tick.elapsed() >= STREAM_CADENCE {
                last_stream_tick = tokio::time::Instant::now();
                let filtered = noise::filter_noise_lines(&session.extract_response());
                if let Some(suffix) = filtered.strip_prefix(last_streamed.as_str()) {
                    if !suffix.is_empty() {
                        self.emit_stream_chunk(suffix).await;
                        last_streamed = filtered;
                    }
                } else {
                    last_streamed = filtered;
                }
            }

            if session.is_prompt_ready() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(session_key, "turn timed out waiting for prompt to settle");
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        self.emit_stream_chunk("").await;

        let raw_response = session.extract_response();
        let final_text = {
            let filtered = noise::filter_noise_lines(&raw_response);
            let trimmed = filtered.trim();
            if trimmed.is_empty() {
                "I've completed processing but have no response to give.".to_string()
            } else {
                trimmed.to_string()
            }
        };

        let ts = chrono::Utc::now().timestamp();
        self.sessions.add_message(session_key, "user", &msg.text, ts).await?;
        self.sessions.add_message(session_key, "assistant", &final_text, ts).await?;

        let mut metadata = msg.metadata.clone();
        metadata.insert("agent".into(), serde_json::json!(session.agent().as_str()));
        metadata.insert("streamed".into(), serde_json::json!(true));
        Ok(OutboundMessage { channel: msg.channel.clone(), text: final_text, metadata })
    }

    /// Gemini exception: its interactive TUI is hard to screen-scrape, so
    /// each turn is a fresh non-interactive subprocess invocation instead
    /// of a driven PTY session.
    async fn run_turn_gemini_noninteractive(
        &self,
        msg: &InboundMessage,
        session_key: &str,
        cwd: String,
    ) -> Result<OutboundMessage> {
        let record = self.sessions.get_or_create(session_key).await?;
        let prompt = self
            .context
            .build_cli_turn_prompt(&record.messages, &msg.text, Some(&msg.channel), Some(session_key), Some(&cwd))
            .await?;

        let command = AgentKind::Gemini.resolve_command();
        let mut parts = shell_words::split(&command)
            .map_err(|e| CommanderError::Pty(format!("could not parse command '{command}': {e}")))?;
        if parts.is_empty() {
            return Err(CommanderError::Pty("empty resolved command for agent gemini".into()));
        }
        let program = parts.remove(0);

        let mut child = Command::new(&program)
            .args(&parts)
            .arg("-p")
            .arg("")
            .current_dir(&cwd)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| CommanderError::ProcessExited { agent: "gemini".into(), code: e.raw_os_error() })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| CommanderError::Pty(format!("failed to write prompt to gemini stdin: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CommanderError::ProcessExited { agent: "gemini".into(), code: e.raw_os_error() })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let stripped = marker::strip_ansi(&combined);
        let final_text = marker::strip_control(stripped.trim());
        let final_text = if final_text.is_empty() {
            "I've completed processing but have no response to give.".to_string()
        } else {
            final_text
        };

        self.emit_stream_chunk(&final_text).await;
        self.emit_stream_chunk("").await;

        let ts = chrono::Utc::now().timestamp();
        self.sessions.add_message(session_key, "user", &msg.text, ts).await?;
        self.sessions.add_message(session_key, "assistant", &final_text, ts).await?;

        let mut metadata = msg.metadata.clone();
        metadata.insert("agent".into(), serde_json::json!(AgentKind::Gemini.as_str()));
        metadata.insert("streamed".into(), serde_json::json!(true));
        Ok(OutboundMessage { channel: msg.channel.clone(), text: final_text, metadata })
    }

    async fn run_turn_proxy(
        &self,
        msg: &InboundMessage,
        session_key: &str,
        agent: AgentKind,
        cwd: String,
        proxy: Arc<ProxyTransport>,
    ) -> Result<OutboundMessage> {
        let record = self.sessions.get_or_create(session_key).await?;
        let prompt = self
            .context
            .build_cli_turn_prompt(&record.messages, &msg.text, Some(&msg.channel), Some(session_key), Some(&cwd))
            .await?;

        let mut stream = proxy.send_and_receive(prompt, agent, Some(cwd));
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Chunk(chunk) => {
                    self.emit_stream_chunk(&chunk).await;
                    text.push_str(&chunk);
                }
                StreamEvent::ToolChunk(notice) => self.emit_tool_event(&notice).await,
                StreamEvent::Done => break,
            }
        }
        self.emit_stream_chunk("").await;

        let final_text = text.trim();
        let final_text = if final_text.is_empty() {
            "I've completed processing but have no response to give.".to_string()
        } else {
            final_text.to_string()
        };

        let ts = chrono::Utc::now().timestamp();
        self.sessions.add_message(session_key, "user", &msg.text, ts).await?;
        self.sessions.add_message(session_key, "assistant", &final_text, ts).await?;

        let mut metadata = msg.metadata.clone();
        metadata.insert("agent".into(), serde_json::json!(agent.as_str()));
        metadata.insert("streamed".into(), serde_json::json!(true));
        Ok(OutboundMessage { channel: msg.channel.clone(), text: final_text, metadata })
    }

    async fn get_or_create_agent_session(
        &self,
        session_key: &str,
        agent: AgentKind,
        cwd: String,
    ) -> Result<Arc<AgentSession>> {
        {
            let sessions = self.agent_sessions.read().await;
            if let Some(existing) = sessions.get(session_key) {
                if existing.agent() == agent {
                    if !existing.is_running() {
                        existing.start()?;
                    }
                    return Ok(Arc::clone(existing));
                }
            }
        }

        let mut sessions = self.agent_sessions.write().await;
        if let Some(old) = sessions.remove(session_key) {
            old.stop();
        }
        let created = AgentSession::new(agent, Some(cwd), 120, 40);
        created.start()?;
        sessions.insert(session_key.to_string(), Arc::clone(&created));
        Ok(created)
    }

    pub async fn close_all_sessions(&self) {
        let mut sessions = self.agent_sessions.write().await;
        for session in sessions.values() {
            session.stop();
        }
        sessions.clear();
    }
}

fn detect_stop_signal(text: &str) -> bool {
    text.contains("[TASK_COMPLETE]") || text.to_uppercase().contains("TASK_COMPLETE")
}

fn build_loop_continuation_prompt() -> String {
    "Continue. Check your plan and proceed with the next step.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_signal_detected_case_insensitively() {
        assert!(detect_stop_signal("done [TASK_COMPLETE]"));
        assert!(detect_stop_signal("all set, task_complete"));
        assert!(!detect_stop_signal("still working"));
    }
}
