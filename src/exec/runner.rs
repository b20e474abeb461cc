// src/exec/runner.rs

//! Supervision of a single spawned process.

use std::io;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::errors::{Result, RundeckError};
use crate::exec::target::ResolvedTarget;
use crate::stream::{Broadcaster, ChunkKind};
use crate::types::{TaskId, TaskOutcome};

/// How long to wait for stdout/stderr to reach EOF once the process is gone.
/// A backgrounded grandchild can keep a pipe open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle to one running process.
///
/// The process itself is owned by a supervisor task spawned in
/// [`ProcessRunner::start`]; this handle only carries the stop signal.
#[derive(Debug)]
pub struct ProcessRunner {
    task_id: TaskId,
    pid: Option<u32>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl ProcessRunner {
    /// Spawn `target` and start streaming its output into `sink`.
    ///
    /// Returns once the OS has created the process. The join handle resolves
    /// to the process outcome after all of its output has been published.
    pub fn start(
        task_id: TaskId,
        target: &ResolvedTarget,
        grace_period: Duration,
        sink: Arc<Broadcaster>,
    ) -> Result<(Self, JoinHandle<TaskOutcome>)> {
        let mut child = target.to_command().spawn().map_err(RundeckError::Spawn)?;
        let pid = child.id();

        info!(
            task_id = %task_id,
            pid = ?pid,
            mode = %target.mode(),
            target = %target,
            "process started"
        );

        // Published before the readers exist so it is always the first chunk.
        let (kind, banner) = describe_start(&task_id, target);
        sink.publish(kind, banner);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, ChunkKind::Stdout, sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, ChunkKind::Stderr, sink));
        }

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let supervisor = tokio::spawn(supervise(
            task_id.clone(),
            child,
            readers,
            stop_rx,
            grace_period,
        ));

        let runner = Self {
            task_id,
            pid,
            stop_tx: Mutex::new(Some(stop_tx)),
        };
        Ok((runner, supervisor))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the process to stop.
    ///
    /// Only the first call delivers the request; it returns `true` if the
    /// supervisor was still listening. Every later call is a no-op.
    pub fn terminate(&self) -> bool {
        let sender = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(tx) => {
                let delivered = tx.send(()).is_ok();
                if delivered {
                    info!(task_id = %self.task_id, pid = ?self.pid, "termination requested");
                } else {
                    debug!(task_id = %self.task_id, "process already finished; nothing to stop");
                }
                delivered
            }
            None => {
                debug!(task_id = %self.task_id, "termination already requested");
                false
            }
        }
    }
}

/// Wait for the process to exit or for a stop request, whichever comes first.
async fn supervise(
    task_id: TaskId,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut stop_rx: oneshot::Receiver<()>,
    grace_period: Duration,
) -> TaskOutcome {
    let outcome = tokio::select! {
        status = child.wait() => exit_outcome(status),

        // A dropped sender disables this branch; we keep waiting for exit.
        Ok(()) = &mut stop_rx => terminate_child(&task_id, &mut child, grace_period).await,
    };

    drain_readers(&task_id, readers).await;

    info!(task_id = %task_id, outcome = ?outcome, "process finished");
    outcome
}

fn exit_outcome(status: io::Result<ExitStatus>) -> TaskOutcome {
    match status {
        Ok(status) => match status.code() {
            Some(code) => TaskOutcome::Exited { code },
            None => signal_outcome(status),
        },
        Err(e) => TaskOutcome::WaitFailed {
            reason: e.to_string(),
        },
    }
}

#[cfg(unix)]
fn signal_outcome(status: ExitStatus) -> TaskOutcome {
    use std::os::unix::process::ExitStatusExt;
    TaskOutcome::Signaled {
        signal: status.signal().unwrap_or(-1),
    }
}

#[cfg(not(unix))]
fn signal_outcome(_status: ExitStatus) -> TaskOutcome {
    TaskOutcome::Exited { code: -1 }
}

/// SIGTERM the process group, then SIGKILL it if the grace period runs out.
async fn terminate_child(task_id: &TaskId, child: &mut Child, grace_period: Duration) -> TaskOutcome {
    send_term(child);

    match timeout(grace_period, child.wait()).await {
        Ok(_) => {
            info!(task_id = %task_id, "process stopped after SIGTERM");
            TaskOutcome::Terminated { forced: false }
        }
        Err(_) => {
            warn!(
                task_id = %task_id,
                grace_ms = grace_period.as_millis() as u64,
                "process ignored SIGTERM; killing"
            );
            send_kill_to_group(child);
            if let Err(e) = child.kill().await {
                warn!(task_id = %task_id, error = %e, "failed to kill child process");
            }
            TaskOutcome::Terminated { forced: true }
        }
    }
}

#[cfg(unix)]
fn send_term(child: &mut Child) {
    signal_group(child, libc::SIGTERM);
}

#[cfg(not(unix))]
fn send_term(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn send_kill_to_group(child: &mut Child) {
    signal_group(child, libc::SIGKILL);
}

#[cfg(not(unix))]
fn send_kill_to_group(_child: &mut Child) {}

/// The child leads its own process group (see `ResolvedTarget::to_command`),
/// so its pid is also the group id.
#[cfg(unix)]
fn signal_group(child: &Child, signal: libc::c_int) {
    let Some(pid) = child.id() else {
        // Already reaped.
        return;
    };
    let rc = unsafe { libc::killpg(pid as libc::pid_t, signal) };
    if rc != 0 {
        debug!(
            pid,
            signal,
            error = %io::Error::last_os_error(),
            "killpg failed"
        );
    }
}

fn spawn_reader<R>(reader: R, kind: ChunkKind, sink: Arc<Broadcaster>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    sink.publish(kind, decode_line(&buf));
                }
                Err(e) => {
                    warn!(
                        task_id = %sink.task_id(),
                        stream = ?kind,
                        error = %e,
                        "error reading process output"
                    );
                    break;
                }
            }
        }
    })
}

/// Strip the line terminator and decode lossily; output is not guaranteed
/// to be UTF-8.
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

async fn drain_readers(task_id: &TaskId, readers: Vec<JoinHandle<()>>) {
    for reader in readers {
        let abort = reader.abort_handle();
        if timeout(READER_DRAIN_TIMEOUT, reader).await.is_err() {
            warn!(
                task_id = %task_id,
                "output pipe still open after exit; abandoning reader"
            );
            abort.abort();
        }
    }
}

/// The notice published once the process has been created.
pub fn describe_start(task_id: &TaskId, target: &ResolvedTarget) -> (ChunkKind, String) {
    (
        ChunkKind::System,
        format!("[task {task_id}] Started {}: {target}", target.mode()),
    )
}

/// The final notice published for an outcome.
pub fn describe_outcome(outcome: &TaskOutcome) -> (ChunkKind, String) {
    match outcome {
        TaskOutcome::Exited { code } => (
            ChunkKind::System,
            format!("[system] process exited with code {code}"),
        ),
        TaskOutcome::Signaled { signal } => (
            ChunkKind::System,
            format!("[system] process killed by signal {signal}"),
        ),
        TaskOutcome::Terminated { forced: false } => (
            ChunkKind::System,
            "[system] process terminated by user".to_string(),
        ),
        TaskOutcome::Terminated { forced: true } => (
            ChunkKind::System,
            "[system] process terminated by user (killed after grace period)".to_string(),
        ),
        TaskOutcome::SpawnFailed { reason } => (
            ChunkKind::Error,
            format!("[error] failed to start process: {reason}"),
        ),
        TaskOutcome::WaitFailed { reason } => (
            ChunkKind::Error,
            format!("[error] lost track of process: {reason}"),
        ),
    }
}
