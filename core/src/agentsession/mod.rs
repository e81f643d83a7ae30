//! Agent session, PTY mode: owns one wrapped CLI's PTY process,
//! converts its raw byte stream into clean text deltas, tracks prompt
//! readiness, and exposes the marker-parsed terminal state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tracing::debug;

use crate::agentdefs::AgentKind;
use crate::error::{CommanderError, Result};
use crate::marker::{self, TerminalState};
use crate::ptybackend::PtyBackend;
use crate::termscreen::TermScreen;

const RAW_BUFFER_CAP: usize = 20_000;

pub struct AgentSession {
    agent: AgentKind,
    cwd: Option<String>,
    cols: u16,
    rows: u16,
    backend: Mutex<Option<PtyBackend>>,
    screen: Mutex<TermScreen>,
    raw_queue: Mutex<VecDeque<Vec<u8>>>,
    text_queue: Mutex<VecDeque<String>>,
    prompt_ready: AtomicBool,
    startup_completed: AtomicBool,
    startup_prompt_handled: AtomicBool,
    ready_notify: Notify,
}

impl AgentSession {
    pub fn new(agent: AgentKind, cwd: Option<String>, cols: u16, rows: u16) -> Arc<Self> {
        Arc::new(Self {
            agent,
            cwd,
            cols,
            rows,
            backend: Mutex::new(None),
            screen: Mutex::new(TermScreen::new(rows, cols)),
            raw_queue: Mutex::new(VecDeque::new()),
            text_queue: Mutex::new(VecDeque::new()),
            prompt_ready: AtomicBool::new(false),
            startup_completed: AtomicBool::new(false),
            startup_prompt_handled: AtomicBool::new(false),
            ready_notify: Notify::new(),
        })
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    /// Launch the wrapped CLI and spawn the dedicated reader task that
    /// drains the PTY backend's byte channel, matching the bounded
    /// single-consumer style the rest of the bus uses.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self.backend.lock().unwrap().is_some() {
            return Ok(());
        }
        let command = self.agent.resolve_command();
        let mut parts = shell_words::split(&command).map_err(|e| {
            CommanderError::Pty(format!("could not parse command '{command}': {e}"))
        })?;
        if parts.is_empty() {
            return Err(CommanderError::Pty(format!(
                "empty resolved command for agent {}",
                self.agent
            )));
        }
        let program = parts.remove(0);
        let (backend, mut rx) = PtyBackend::spawn(
            &program,
            &parts,
            self.cwd.as_deref(),
            self.cols,
            self.rows,
        )?;
        *self.backend.lock().unwrap() = Some(backend);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                this.on_raw_chunk(chunk);
            }
        });
        Ok(())
    }

    fn on_raw_chunk(self: &Arc<Self>, chunk: Vec<u8>) {
        {
            let mut raw = self.raw_queue.lock().unwrap();
            raw.push_back(chunk.clone());
            while raw.len() > RAW_BUFFER_CAP {
                raw.pop_front();
            }
        }
        let delta = {
            let mut screen = self.screen.lock().unwrap();
            let before = screen.visible_text();
            screen.process(&chunk);
            let after = screen.visible_text();
            if after == before {
                String::new()
            } else {
                after
            }
        };
        let probe_text = if delta.is_empty() {
            String::from_utf8_lossy(&chunk).into_owned()
        } else {
            delta.clone()
        };
        if !delta.is_empty() {
            self.text_queue.lock().unwrap().push_back(delta);
        }
        self.handle_startup_prompts(&probe_text);
        self.update_prompt_state();
    }

    /// Send raw text, ending with Enter if the caller didn't already.
    pub fn submit(&self, text: &str) -> Result<()> {
        let backend_guard = self.backend.lock().unwrap();
        let backend = backend_guard
            .as_ref()
            .ok_or_else(|| CommanderError::Pty("agent session not started".into()))?;
        let payload = if text.ends_with('\r') || text.ends_with('\n') {
            text.to_string()
        } else {
            format!("{text}\r")
        };
        backend.write_all(payload.as_bytes())?;
        // Codex can treat large/multiline payloads as a pasted-content token
        // and keep focus in the composer; one extra Enter confirms submit.
        if self.agent == AgentKind::Codex && (text.len() > 800 || text.contains('\n')) {
            backend.write_all(b"\r")?;
        }
        Ok(())
    }

    pub fn send_raw(&self, text: &str) -> Result<()> {
        let backend_guard = self.backend.lock().unwrap();
        let backend = backend_guard
            .as_ref()
            .ok_or_else(|| CommanderError::Pty("agent session not started".into()))?;
        backend.write_all(text.as_bytes())
    }

    pub fn is_prompt_ready(&self) -> bool {
        self.prompt_ready.load(Ordering::SeqCst)
    }

    pub fn should_suppress_chat_output(&self) -> bool {
        !self.startup_completed.load(Ordering::SeqCst)
    }

    pub async fn wait_until_ready(&self, timeout: std::time::Duration) -> bool {
        if self.is_prompt_ready() {
            return true;
        }
        let wait = self.ready_notify.notified();
        tokio::select! {
            _ = wait => self.is_prompt_ready(),
            _ = tokio::time::sleep(timeout) => self.is_prompt_ready(),
        }
    }

    pub fn get_snapshot(&self) -> String {
        self.screen.lock().unwrap().full_snapshot()
    }

    pub fn get_terminal_state(&self) -> TerminalState {
        marker::get_terminal_state(self.agent, &self.get_snapshot())
    }

    pub fn extract_response(&self) -> String {
        let snapshot = self.get_snapshot();
        marker::extract_response(self.agent, &snapshot)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        if let Some(backend) = self.backend.lock().unwrap().as_ref() {
            backend.resize(cols, rows)?;
        }
        self.screen.lock().unwrap().resize(rows, cols);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.backend.lock().unwrap().is_some()
    }

    pub fn read_available_raw(&self, max_chunks: usize) -> Vec<Vec<u8>> {
        let mut q = self.raw_queue.lock().unwrap();
        let mut out = Vec::new();
        for _ in 0..max_chunks {
            match q.pop_front() {
                Some(chunk) => out.push(chunk),
                None => break,
            }
        }
        out
    }

    pub fn read_available(&self, max_chunks: usize) -> Vec<String> {
        let mut q = self.text_queue.lock().unwrap();
        let mut out = Vec::new();
        for _ in 0..max_chunks {
            match q.pop_front() {
                Some(chunk) => out.push(chunk),
                None => break,
            }
        }
        out
    }

    pub fn prepare_for_response(&self, clear_raw: bool) {
        self.prompt_ready.store(false, Ordering::SeqCst);
        if clear_raw {
            self.raw_queue.lock().unwrap().clear();
        }
        self.text_queue.lock().unwrap().clear();
    }

    pub fn stop(&self) {
        if let Some(backend) = self.backend.lock().unwrap().take() {
            backend.kill();
        }
    }

    fn handle_startup_prompts(&self, text: &str) {
        if self.startup_prompt_handled.load(Ordering::SeqCst) {
            return;
        }
        let lowered = text.to_lowercase();
        match self.agent {
            AgentKind::Codex => {
                if lowered.contains("update available") || lowered.contains("press enter to continue")
                {
                    let _ = self.send_raw("2\r");
                    self.startup_prompt_handled.store(true, Ordering::SeqCst);
                }
            }
            AgentKind::Claude => {
                if lowered.contains("yes, i trust this folder") || lowered.contains("trust this folder")
                {
                    let _ = self.send_raw("1\r");
                    self.startup_prompt_handled.store(true, Ordering::SeqCst);
                }
            }
            AgentKind::Gemini => {}
        }
    }

    fn update_prompt_state(&self) {
        let tail = self.tail_text(8);
        let is_ready = !tail.is_empty()
            && self
                .agent
                .prompt_patterns()
                .iter()
                .any(|re| re.is_match(&tail));
        self.prompt_ready.store(is_ready, Ordering::SeqCst);
        if is_ready {
            self.startup_completed.store(true, Ordering::SeqCst);
            self.ready_notify.notify_waiters();
        }
        debug!(agent = %self.agent, is_ready, "prompt state updated");
    }

    fn tail_text(&self, lines: usize) -> String {
        let snapshot = self.screen.lock().unwrap().visible_text();
        snapshot
            .lines()
            .rev()
            .take(lines)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_not_ready() {
        let session = AgentSession::new(AgentKind::Claude, None, 80, 24);
        assert!(!session.is_prompt_ready());
        assert!(session.should_suppress_chat_output());
    }

    #[test]
    fn prepare_for_response_clears_queues() {
        let session = AgentSession::new(AgentKind::Claude, None, 80, 24);
        session.text_queue.lock().unwrap().push_back("hi".into());
        session.prepare_for_response(true);
        assert!(session.read_available(10).is_empty());
    }
}
