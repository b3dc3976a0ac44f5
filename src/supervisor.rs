//! Lifecycle supervision for the external MCP server process.
//!
//! The supervisor owns at most one child process and walks it through a
//! small state machine: `Absent -> Starting -> Ready`, with `Starting ->
//! Failed` when the readiness marker does not appear within the budget. The
//! whole transition runs under one async mutex, so concurrent callers block
//! on the same start attempt and exactly one process is ever spawned.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::READY_MARKER;
use crate::error::{BrokerError, BrokerResult};

pub const DEFAULT_READY_ATTEMPTS: u32 = 10;
pub const DEFAULT_READY_INTERVAL: Duration = Duration::from_secs(1);

enum State {
    Absent,
    Ready(Child),
    /// Start attempt exhausted the budget. The child, if it spawned at all,
    /// is left running so its output stays available for diagnostics; a
    /// later `close()` reaps it.
    Failed(Option<Child>),
}

/// Supervises the external server process behind the RPC client facade.
pub struct ProcessSupervisor {
    program: String,
    args: Vec<String>,
    ready_attempts: u32,
    ready_interval: Duration,
    state: Mutex<State>,
}

impl ProcessSupervisor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ready_attempts: DEFAULT_READY_ATTEMPTS,
            ready_interval: DEFAULT_READY_INTERVAL,
            state: Mutex::new(State::Absent),
        }
    }

    /// Override the readiness budget (attempts x poll interval).
    pub fn with_ready_budget(mut self, attempts: u32, interval: Duration) -> Self {
        self.ready_attempts = attempts;
        self.ready_interval = interval;
        self
    }

    /// Make sure the server process is running and has reported readiness.
    ///
    /// Fast path: already `Ready` and the child has not exited. Otherwise a
    /// fresh start runs to completion while holding the state lock.
    pub async fn ensure_running(&self) -> BrokerResult<()> {
        let mut state = self.state.lock().await;

        if let State::Ready(child) = &mut *state {
            match child.try_wait() {
                Ok(None) => return Ok(()),
                Ok(Some(status)) => {
                    warn!(%status, "Server process exited, restarting");
                }
                Err(err) => {
                    warn!(error = %err, "Failed to poll server process, restarting");
                }
            }
            *state = State::Absent;
        }

        if let State::Failed(_) = &*state {
            // A previous attempt failed; reap it before trying again.
            self.teardown(&mut state).await;
        }

        info!(program = %self.program, "Starting server process");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                BrokerError::supervisor_start(format!(
                    "Failed to spawn '{}': {}",
                    self.program, e
                ))
            })?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                *state = State::Failed(Some(child));
                return Err(BrokerError::supervisor_start(
                    "Server process has no stdout pipe",
                ));
            }
        };

        let budget = self.ready_interval * self.ready_attempts;
        match tokio::time::timeout(budget, wait_for_marker(stdout)).await {
            Ok(Ok(rest)) => {
                info!("Server process reported readiness");
                // Keep draining stdout so the child never blocks on a full
                // pipe.
                tokio::spawn(drain_stdout(rest));
                *state = State::Ready(child);
                Ok(())
            }
            Ok(Err(message)) => {
                *state = State::Failed(Some(child));
                Err(BrokerError::supervisor_start(message))
            }
            Err(_) => {
                *state = State::Failed(Some(child));
                Err(BrokerError::supervisor_start(format!(
                    "Server did not report readiness within {:?}",
                    budget
                )))
            }
        }
    }

    /// Whether the supervisor currently believes the server is ready.
    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.lock().await, State::Ready(_))
    }

    /// Kill the child if present and reset to `Absent`. Safe to call
    /// repeatedly and after failed starts; a later `ensure_running()` may
    /// start a fresh process.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.teardown(&mut state).await;
    }

    async fn teardown(&self, state: &mut State) {
        let child = match std::mem::replace(state, State::Absent) {
            State::Ready(child) => Some(child),
            State::Failed(child) => child,
            State::Absent => None,
        };
        if let Some(mut child) = child {
            if let Err(err) = child.start_kill() {
                debug!(error = %err, "Kill signal failed (process likely already gone)");
            }
            if let Err(err) = child.wait().await {
                warn!(error = %err, "Failed to reap server process");
            } else {
                info!("Server process stopped");
            }
        }
    }
}

/// Scan the child's stdout line by line until the readiness marker appears.
/// Returns the reader so the caller can keep draining it, or an error
/// message when the stream ends first.
async fn wait_for_marker(stdout: ChildStdout) -> Result<BufReader<ChildStdout>, String> {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return Err("Server process closed stdout before becoming ready".to_string()),
            Ok(_) => {
                let trimmed = line.trim_end();
                debug!(line = %trimmed, "server stdout");
                if trimmed.contains(READY_MARKER) {
                    return Ok(reader);
                }
            }
            Err(err) => return Err(format!("Failed to read server stdout: {}", err)),
        }
    }
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => debug!(line = %line.trim_end(), "server stdout"),
        }
    }
}
