use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque task identifier.
///
/// Generated from a random UUID (v4) so that identifiers are unique for the
/// lifetime of the registry and cannot be guessed from one another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        TaskId(Arc::from(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        TaskId(Arc::from(s))
    }
}

impl std::borrow::Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Serialize for TaskId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// How a run request should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskMode {
    /// Execute a script file directly (no shell).
    Script,
    /// Execute a command line through the configured shell.
    Command,
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskMode::Script => f.write_str("script"),
            TaskMode::Command => f.write_str("command"),
        }
    }
}

impl FromStr for TaskMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "script" => Ok(TaskMode::Script),
            "command" => Ok(TaskMode::Command),
            other => Err(format!(
                "unsupported execution mode: {other:?} (expected \"script\" or \"command\")"
            )),
        }
    }
}

/// Lifecycle state of a task.
///
/// ```text
/// Pending ──► Running ──► Completed | Terminated | Failed
///    └──────────────────► Failed (spawn error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Terminated,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Terminated | TaskState::Failed
        )
    }

    /// Whether moving from `self` to `next` respects the state machine.
    /// Terminal states never change again.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Terminated)
                | (Running, Failed)
        )
    }
}

/// What a new subscriber sees when it attaches to a task that has already
/// produced output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayPolicy {
    /// Only chunks published after subscribing, plus the final notice if
    /// the task has already ended.
    None,
    /// The retained log first, then live chunks.
    Buffered,
}

impl Default for ReplayPolicy {
    fn default() -> Self {
        ReplayPolicy::Buffered
    }
}

impl FromStr for ReplayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(ReplayPolicy::None),
            "buffered" => Ok(ReplayPolicy::Buffered),
            other => Err(format!(
                "invalid replay policy: {other} (expected \"none\" or \"buffered\")"
            )),
        }
    }
}

/// How a supervised process ended. Exactly one per task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Exited on its own with a status code (zero or not).
    Exited { code: i32 },
    /// Killed by a signal we did not send.
    Signaled { signal: i32 },
    /// Stopped on request; `forced` when the grace period ran out.
    Terminated { forced: bool },
    /// The process could not be started.
    SpawnFailed { reason: String },
    /// Waiting on the child failed; its real fate is unknown.
    WaitFailed { reason: String },
}

impl TaskOutcome {
    pub fn final_state(&self) -> TaskState {
        match self {
            TaskOutcome::Exited { .. } | TaskOutcome::Signaled { .. } => TaskState::Completed,
            TaskOutcome::Terminated { .. } => TaskState::Terminated,
            TaskOutcome::SpawnFailed { .. } | TaskOutcome::WaitFailed { .. } => TaskState::Failed,
        }
    }
}
