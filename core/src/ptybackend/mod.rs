//! PTY backend: spawns a wrapped CLI under a real pseudo-terminal and
//! exposes a byte-stream read channel plus a writer.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CommanderError, Result};

pub struct PtyBackend {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    master: Arc<Mutex<Box<dyn MasterPty + Send>>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
}

impl PtyBackend {
    /// Spawn `program` with `args` in `cwd` under a PTY of the given size.
    /// Returns the backend plus the unbounded channel fed by a dedicated
    /// OS reader thread (blocking PTY reads never touch the tokio runtime).
    pub fn spawn(
        program: &str,
        args: &[String],
        cwd: Option<&str>,
        cols: u16,
        rows: u16,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Vec<u8>>)> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CommanderError::Pty(e.to_string()))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| CommanderError::Pty(e.to_string()))?;
        drop(pair.slave);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| CommanderError::Pty(e.to_string()))?;

        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match std::io::Read::read(&mut reader, &mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "pty reader thread exiting");
                        break;
                    }
                }
            }
        });

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| CommanderError::Pty(e.to_string()))?;

        Ok((
            Self {
                writer: Arc::new(Mutex::new(writer)),
                master: Arc::new(Mutex::new(pair.master)),
                child: Arc::new(Mutex::new(child)),
            },
            rx,
        ))
    }

    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| CommanderError::Pty("writer lock poisoned".into()))?;
        writer
            .write_all(data)
            .map_err(|e| CommanderError::Pty(e.to_string()))?;
        writer.flush().map_err(|e| CommanderError::Pty(e.to_string()))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = self
            .master
            .lock()
            .map_err(|_| CommanderError::Pty("master lock poisoned".into()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CommanderError::Pty(e.to_string()))
    }

    /// True if the child process has already exited.
    pub fn has_exited(&self) -> Option<i32> {
        let mut child = self.child.lock().ok()?;
        match child.try_wait() {
            Ok(Some(status)) => Some(status.exit_code() as i32),
            _ => None,
        }
    }

    pub fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.kill() {
                warn!(error = %e, "failed to kill pty child process");
            }
        }
    }
}
