// src/registry/task.rs

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::exec::{describe_outcome, ProcessRunner};
use crate::stream::{Broadcaster, ChunkStream};
use crate::types::{TaskId, TaskMode, TaskOutcome, TaskState};

/// One task as tracked by the registry.
///
/// Each entry has its own lock; operations on one task never wait on
/// another task's state.
#[derive(Debug)]
pub struct TaskEntry {
    id: TaskId,
    mode: TaskMode,
    target: String,
    started_at: SystemTime,
    broadcaster: Arc<Broadcaster>,
    inner: Mutex<EntryInner>,
}

#[derive(Debug)]
struct EntryInner {
    state: TaskState,
    runner: Option<ProcessRunner>,
    pid: Option<u32>,
    /// A stop that arrived before the runner was attached.
    stop_requested: bool,
    outcome: Option<TaskOutcome>,
    finished_at: Option<Instant>,
}

/// Point-in-time view of a task, as returned by the status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub mode: TaskMode,
    pub target: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TaskOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Seconds since the Unix epoch.
    pub started_at: u64,
    pub chunks: u64,
    pub subscribers: usize,
}

impl TaskEntry {
    pub(crate) fn new(
        id: TaskId,
        mode: TaskMode,
        target: String,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            id,
            mode,
            target,
            started_at: SystemTime::now(),
            broadcaster,
            inner: Mutex::new(EntryInner {
                state: TaskState::Pending,
                runner: None,
                pid: None,
                stop_requested: false,
                outcome: None,
                finished_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> TaskState {
        self.lock().state
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.lock().outcome.clone()
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    /// Attach an observer to this task's output.
    pub fn subscribe(&self) -> ChunkStream {
        self.broadcaster.subscribe()
    }

    /// Hand the freshly spawned runner to the entry (Pending → Running).
    pub(crate) fn attach_runner(&self, runner: ProcessRunner) {
        let mut inner = self.lock();
        if !inner.state.can_advance_to(TaskState::Running) {
            warn!(task_id = %self.id, state = ?inner.state, "runner attached to a task that is not pending");
            runner.terminate();
            return;
        }
        inner.state = TaskState::Running;
        inner.pid = runner.pid();
        if inner.stop_requested {
            debug!(task_id = %self.id, "applying stop requested during spawn");
            runner.terminate();
        }
        inner.runner = Some(runner);
    }

    /// Request termination. Idempotent: a no-op once the task is terminal or
    /// a stop has already been sent.
    pub fn terminate(&self) {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            debug!(task_id = %self.id, state = ?inner.state, "stop on finished task ignored");
            return;
        }
        match inner.runner.as_ref() {
            Some(runner) => {
                runner.terminate();
            }
            None => inner.stop_requested = true,
        }
    }

    /// Record the outcome and close the output stream with the final notice.
    ///
    /// Only the first call has an effect.
    pub(crate) fn finish(&self, outcome: TaskOutcome) -> bool {
        let next = outcome.final_state();
        {
            let mut inner = self.lock();
            if !inner.state.can_advance_to(next) {
                debug!(
                    task_id = %self.id,
                    from = ?inner.state,
                    to = ?next,
                    "ignoring duplicate or invalid completion"
                );
                return false;
            }
            inner.state = next;
            inner.outcome = Some(outcome.clone());
            inner.finished_at = Some(Instant::now());
            inner.runner = None;
        }

        let (kind, text) = describe_outcome(&outcome);
        self.broadcaster.close(kind, text);
        info!(task_id = %self.id, state = ?next, "task finished");
        true
    }

    /// Terminal and nobody is watching.
    pub fn is_reapable(&self) -> bool {
        self.state().is_terminal() && self.broadcaster.subscriber_count() == 0
    }

    /// Terminal for at least `retention`.
    pub(crate) fn finished_longer_than(&self, retention: Duration) -> bool {
        self.lock()
            .finished_at
            .is_some_and(|at| at.elapsed() >= retention)
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let (state, outcome, pid) = {
            let inner = self.lock();
            (inner.state, inner.outcome.clone(), inner.pid)
        };
        TaskSnapshot {
            task_id: self.id.clone(),
            mode: self.mode,
            target: self.target.clone(),
            state,
            outcome,
            pid,
            started_at: self
                .started_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            chunks: self.broadcaster.published_count(),
            subscribers: self.broadcaster.subscriber_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReplayPolicy;

    fn entry() -> TaskEntry {
        let id = TaskId::from("abc");
        let broadcaster = Broadcaster::new(id.clone(), ReplayPolicy::None, 1024);
        TaskEntry::new(id, TaskMode::Command, "echo hi".to_string(), broadcaster)
    }

    #[test]
    fn spawn_failure_moves_pending_to_failed_once() {
        let e = entry();
        assert!(e.finish(TaskOutcome::SpawnFailed { reason: "nope".into() }));
        assert_eq!(e.state(), TaskState::Failed);
        assert!(e.broadcaster().is_closed());

        // A second completion is ignored and publishes nothing.
        assert!(!e.finish(TaskOutcome::Exited { code: 0 }));
        assert_eq!(e.broadcaster().published_count(), 1);
    }

    #[test]
    fn pending_task_cannot_complete_normally() {
        let e = entry();
        assert!(!e.finish(TaskOutcome::Exited { code: 0 }));
        assert_eq!(e.state(), TaskState::Pending);
    }

    #[test]
    fn stop_before_runner_is_remembered() {
        let e = entry();
        e.terminate();
        assert!(e.lock().stop_requested);
        assert_eq!(e.state(), TaskState::Pending);
    }

    #[test]
    fn terminal_task_is_reapable_only_after_observers_leave() {
        let e = entry();
        let stream = e.subscribe();
        assert!(!e.is_reapable());
        e.finish(TaskOutcome::SpawnFailed { reason: "x".into() });
        assert!(!e.is_reapable());
        drop(stream);
        assert!(e.is_reapable());
    }

    #[test]
    fn snapshot_reports_outcome() {
        let e = entry();
        e.finish(TaskOutcome::SpawnFailed { reason: "boom".into() });
        let snap = e.snapshot();
        assert_eq!(snap.state, TaskState::Failed);
        assert_eq!(snap.chunks, 1);
        assert!(matches!(snap.outcome, Some(TaskOutcome::SpawnFailed { .. })));
    }
}
