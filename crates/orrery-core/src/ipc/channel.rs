//! Worker channel: process lifecycle and deadline-bounded requests.
//!
//! The channel owns the worker subprocess. A reader thread pumps response
//! frames from the worker's stdout into an `mpsc` queue so every wait can
//! use `recv_timeout`. On timeout the worker is killed (politely, then
//! SIGKILL) and a fresh one with an empty namespace is started; the
//! in-flight command gets a synthesized timeout result. A user interrupt
//! pushes an [`WorkerResponse::Interrupted`] sentinel onto the queue to
//! unblock the reader, then takes the same kill-and-restart path.
//!
//! The channel is single-reader, single-writer: one command in flight at a
//! time.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};

use super::protocol::{
    ExecutePayload, WorkerCommand, WorkerResponse, read_message, write_message,
};

/// Default per-command deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Grace period between a polite shutdown request and SIGKILL.
const KILL_GRACE: Duration = Duration::from_millis(50);

/// The result of an `execute` request.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteOutcome {
    /// The worker produced a result (possibly an error, possibly the
    /// synthesized timeout result).
    Completed(ExecutePayload),
    /// A user interrupt arrived while the command was in flight. The
    /// worker has been replaced; all namespace state is gone.
    Interrupted,
}

/// What the interrupt handle needs to reach: the live response queue (to
/// unblock the engine-side reader) and the worker pid (to stop the
/// computation itself).
struct InterruptTarget {
    tx: mpsc::Sender<WorkerResponse>,
    pid: u32,
}

/// Thread-safe handle for interrupting the current command from outside
/// the channel owner (e.g. a transport task that must not take the
/// session lock).
#[derive(Clone)]
pub struct InterruptHandle {
    target: Arc<Mutex<Option<InterruptTarget>>>,
}

impl InterruptHandle {
    /// Push the interrupt sentinel and kill the worker process. No-op when
    /// no worker is running.
    pub fn interrupt(&self) {
        let guard = self.target.lock().expect("interrupt target lock");
        if let Some(target) = guard.as_ref() {
            let _ = target.tx.send(WorkerResponse::Interrupted);
            kill_pid(target.pid);
        }
    }
}

#[cfg(unix)]
fn kill_pid(pid: u32) {
    // SIGKILL: the only signal arbitrary user code cannot ignore.
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_pid(_pid: u32) {
    // The channel kills via Child::kill when it processes the sentinel.
}

struct Worker {
    child: Child,
    stdin: BufWriter<std::process::ChildStdin>,
    // Mutex only for the Sync bound (sessions live behind async locks);
    // the channel is single-reader by contract.
    rx: Mutex<mpsc::Receiver<WorkerResponse>>,
}

impl Worker {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<WorkerResponse, RecvTimeoutError> {
        self.rx.lock().expect("worker receiver lock").recv_timeout(timeout)
    }

    fn try_recv(&self) -> Option<WorkerResponse> {
        self.rx.lock().expect("worker receiver lock").try_recv().ok()
    }
}

/// Channel to an isolated worker process.
pub struct WorkerChannel {
    worker: Option<Worker>,
    timeout: Duration,
    interrupt_target: Arc<Mutex<Option<InterruptTarget>>>,
}

enum RequestResult {
    Response(WorkerResponse),
    Interrupted,
    TimedOut,
}

impl WorkerChannel {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            worker: None,
            timeout,
            interrupt_target: Arc::new(Mutex::new(None)),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// A cloneable handle that can interrupt the in-flight command from
    /// any thread. Valid across worker restarts.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            target: self.interrupt_target.clone(),
        }
    }

    /// Execute a cell in the worker.
    pub fn execute(&mut self, source: &str) -> Result<ExecuteOutcome> {
        let command = WorkerCommand::Execute {
            source: source.to_string(),
        };
        match self.request(&command)? {
            RequestResult::Response(WorkerResponse::Executed(payload)) => {
                Ok(ExecuteOutcome::Completed(payload))
            }
            RequestResult::Response(other) => Err(unexpected("execute", &other)),
            RequestResult::Interrupted => Ok(ExecuteOutcome::Interrupted),
            RequestResult::TimedOut => Ok(ExecuteOutcome::Completed(ExecutePayload::timeout(
                self.timeout.as_secs(),
            ))),
        }
    }

    /// Read a namespace variable as JSON.
    pub fn get_var(&mut self, name: &str) -> Result<serde_json::Value> {
        let command = WorkerCommand::GetVar {
            name: name.to_string(),
        };
        match self.request(&command)? {
            RequestResult::Response(WorkerResponse::Var {
                value_json: Some(json),
                ..
            }) => serde_json::from_str(&json)
                .map_err(|e| Error::Serialization(format!("invalid value from worker: {e}"))),
            RequestResult::Response(WorkerResponse::Var {
                error: Some(message),
                ..
            }) => Err(Error::Execution(message)),
            RequestResult::Response(WorkerResponse::Var { .. }) => {
                Err(Error::Ipc("empty get_var response".to_string()))
            }
            RequestResult::Response(other) => Err(unexpected("get_var", &other)),
            RequestResult::Interrupted => Err(Error::Interrupted),
            RequestResult::TimedOut => Err(Error::Ipc("get_var timed out".to_string())),
        }
    }

    /// Write a namespace variable from JSON.
    pub fn set_var(&mut self, name: &str, value: &serde_json::Value) -> Result<()> {
        let command = WorkerCommand::SetVar {
            name: name.to_string(),
            value_json: value.to_string(),
        };
        match self.request(&command)? {
            RequestResult::Response(WorkerResponse::Ok) => Ok(()),
            RequestResult::Response(other) => Err(unexpected("set_var", &other)),
            RequestResult::Interrupted => Err(Error::Interrupted),
            RequestResult::TimedOut => Err(Error::Ipc("set_var timed out".to_string())),
        }
    }

    /// Clear the worker namespace. A no-op when no worker is running (a
    /// fresh worker starts empty anyway).
    pub fn reset(&mut self) -> Result<()> {
        if self.worker.is_none() {
            return Ok(());
        }
        match self.request(&WorkerCommand::Reset)? {
            RequestResult::Response(WorkerResponse::Ok) => Ok(()),
            RequestResult::Response(other) => Err(unexpected("reset", &other)),
            RequestResult::Interrupted => Err(Error::Interrupted),
            RequestResult::TimedOut => Err(Error::Ipc("reset timed out".to_string())),
        }
    }

    /// Whether a worker process is currently running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the worker, if any. Escalates from a polite shutdown to
    /// SIGKILL after a short grace window.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            self.clear_interrupt_target();
            let _ = write_message(&mut worker.stdin, &WorkerCommand::Shutdown);
            std::thread::sleep(KILL_GRACE);
            if let Err(e) = worker.child.kill() {
                if e.kind() != std::io::ErrorKind::InvalidInput {
                    tracing::warn!("failed to kill worker: {e}");
                }
            }
            let _ = worker.child.wait();
        }
    }

    // ---- internals ------------------------------------------------------

    fn request(&mut self, command: &WorkerCommand) -> Result<RequestResult> {
        self.ensure_worker()?;

        // An interrupt can land while no command is in flight (between
        // cells of a cancelled plan). Its sentinel is still in the queue
        // and its worker is already dead; replace both before sending.
        let stale_interrupt = {
            let worker = self.worker.as_ref().expect("worker just ensured");
            let mut found = false;
            while let Some(stale) = worker.try_recv() {
                if matches!(stale, WorkerResponse::Interrupted) {
                    found = true;
                }
            }
            found
        };
        if stale_interrupt {
            tracing::debug!("stale interrupt sentinel; restarting worker before send");
            self.restart();
        }

        let Some(worker) = self.worker.as_mut() else {
            return Ok(RequestResult::TimedOut);
        };

        if write_message(&mut worker.stdin, command).is_err() {
            // The worker died between commands; replace it and report the
            // loss in the timeout shape.
            tracing::warn!("worker write failed; restarting worker");
            self.restart();
            return Ok(RequestResult::TimedOut);
        }

        match worker.recv_timeout(self.timeout) {
            Ok(WorkerResponse::Interrupted) => {
                tracing::debug!("interrupt sentinel received; restarting worker");
                self.restart();
                Ok(RequestResult::Interrupted)
            }
            Ok(response) => Ok(RequestResult::Response(response)),
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout = ?self.timeout, "worker deadline expired; restarting worker");
                self.restart();
                Ok(RequestResult::TimedOut)
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("worker response queue closed; restarting worker");
                self.restart();
                Ok(RequestResult::TimedOut)
            }
        }
    }

    fn ensure_worker(&mut self) -> Result<()> {
        if self.worker.is_none() {
            self.worker = Some(self.spawn_worker()?);
        }
        Ok(())
    }

    /// Kill the current worker and start a fresh one with an empty
    /// namespace. Respawn failures are deferred to the next command.
    fn restart(&mut self) {
        self.stop();
        match self.spawn_worker() {
            Ok(worker) => self.worker = Some(worker),
            Err(e) => tracing::warn!("failed to respawn worker: {e}"),
        }
    }

    fn spawn_worker(&mut self) -> Result<Worker> {
        let path = find_worker_binary()?;

        let mut child = Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "failed to spawn worker process '{}': {e}",
                    path.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("failed to get worker stdout".to_string()))?;

        let (tx, rx) = mpsc::channel();
        let reader_tx = tx.clone();
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                match read_message::<_, WorkerResponse>(&mut reader) {
                    Ok(message) => {
                        if reader_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        *self
            .interrupt_target
            .lock()
            .expect("interrupt target lock") = Some(InterruptTarget {
            tx,
            pid: child.id(),
        });

        let mut worker = Worker {
            child,
            stdin: BufWriter::new(stdin),
            rx: Mutex::new(rx),
        };

        // Verify the worker is alive before handing it out.
        write_message(&mut worker.stdin, &WorkerCommand::Ping)?;
        match worker.recv_timeout(self.timeout) {
            Ok(WorkerResponse::Pong) => Ok(worker),
            Ok(other) => Err(Error::Ipc(format!(
                "unexpected response to ping: {other:?}"
            ))),
            Err(e) => Err(Error::Ipc(format!("worker did not answer ping: {e}"))),
        }
    }

    fn clear_interrupt_target(&self) {
        *self
            .interrupt_target
            .lock()
            .expect("interrupt target lock") = None;
    }
}

impl Default for WorkerChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkerChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

fn unexpected(context: &str, response: &WorkerResponse) -> Error {
    Error::Ipc(format!("unexpected response to {context}: {response:?}"))
}

/// Locate the `orrery-worker` binary.
///
/// Search order: `ORRERY_WORKER_PATH`, next to the current executable,
/// the system PATH, then the workspace target directory (development).
fn find_worker_binary() -> Result<PathBuf> {
    let worker_name = if cfg!(windows) {
        "orrery-worker.exe"
    } else {
        "orrery-worker"
    };

    if let Ok(path) = std::env::var("ORRERY_WORKER_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        let candidate = exe_dir.join(worker_name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    if let Ok(path) = which::which(worker_name) {
        return Ok(path);
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        for profile in &["debug", "release"] {
            let candidate = PathBuf::from(&manifest_dir)
                .join("..")
                .join("..")
                .join("target")
                .join(profile)
                .join(worker_name);
            if candidate.exists() {
                return Ok(candidate.canonicalize().unwrap_or(candidate));
            }
        }
    }

    Err(Error::Ipc(
        "could not find orrery-worker binary. Set ORRERY_WORKER_PATH or ensure it's in PATH."
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests that drive a real worker live in tests/worker_channel.rs and
    // are ignored unless the orrery-worker binary has been built.

    #[test]
    fn test_channel_starts_without_worker() {
        let channel = WorkerChannel::new();
        assert!(!channel.is_running());
        assert_eq!(channel.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_reset_without_worker_is_noop() {
        let mut channel = WorkerChannel::new();
        assert!(channel.reset().is_ok());
        assert!(!channel.is_running());
    }

    #[test]
    fn test_interrupt_without_worker_is_noop() {
        let channel = WorkerChannel::new();
        channel.interrupt_handle().interrupt();
        assert!(!channel.is_running());
    }
}
