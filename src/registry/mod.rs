// src/registry/mod.rs

//! Process-wide table of tasks.
//!
//! The registry is an ordinary value created at startup and shared behind an
//! `Arc`. The map lock is only held to insert, look up or remove entries;
//! everything per task lives behind the entry's own lock.

pub mod reaper;
pub mod task;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::errors::{Result, RundeckError};
use crate::exec::{resolve_target, ProcessRunner};
use crate::fs::{FileSystem, RealFileSystem};
use crate::stream::{Broadcaster, ChunkStream};
use crate::types::{TaskId, TaskOutcome};

pub use reaper::spawn_reaper;
pub use task::{TaskEntry, TaskSnapshot};

#[derive(Debug)]
pub struct TaskRegistry {
    settings: Settings,
    fs: Arc<dyn FileSystem>,
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new(settings: Settings) -> Arc<Self> {
        Self::with_filesystem(settings, Arc::new(RealFileSystem))
    }

    pub fn with_filesystem(settings: Settings, fs: Arc<dyn FileSystem>) -> Arc<Self> {
        Arc::new(Self {
            settings,
            fs,
            tasks: RwLock::new(HashMap::new()),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, Arc<TaskEntry>>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, Arc<TaskEntry>>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate a run request, register the task and spawn its process.
    ///
    /// A spawn failure still yields a task id: the task is `Failed` and its
    /// stream carries the `[error]` notice. Must be called from within a
    /// Tokio runtime.
    pub fn create(&self, mode: &str, value: &str) -> Result<TaskId> {
        let target = resolve_target(mode, value, &self.settings.execution, self.fs.as_ref())?;

        let entry = {
            let mut tasks = self.write();

            if let Some(limit) = self.settings.execution.max_running_tasks {
                let active = tasks.values().filter(|t| !t.state().is_terminal()).count();
                if active >= limit {
                    warn!(active, limit, "refusing run request; too many running tasks");
                    return Err(RundeckError::Busy { limit });
                }
            }

            let mut id = TaskId::generate();
            while tasks.contains_key(&id) {
                id = TaskId::generate();
            }

            let broadcaster = Broadcaster::new(
                id.clone(),
                self.settings.stream.replay,
                self.settings.stream.max_log_bytes,
            );
            let entry = Arc::new(TaskEntry::new(
                id.clone(),
                target.mode(),
                target.to_string(),
                broadcaster,
            ));
            tasks.insert(id, entry.clone());
            entry
        };

        let id = entry.id().clone();
        let started = ProcessRunner::start(
            id.clone(),
            &target,
            self.settings.execution.stop_grace_period,
            entry.broadcaster().clone(),
        );

        match started {
            Ok((runner, supervisor)) => {
                entry.attach_runner(runner);
                let watched = entry.clone();
                tokio::spawn(async move {
                    let outcome = match supervisor.await {
                        Ok(outcome) => outcome,
                        Err(e) => TaskOutcome::WaitFailed {
                            reason: e.to_string(),
                        },
                    };
                    watched.finish(outcome);
                });
            }
            Err(e) => {
                let reason = match e {
                    RundeckError::Spawn(io) => io.to_string(),
                    other => other.to_string(),
                };
                warn!(task_id = %id, error = %reason, "failed to spawn process");
                entry.finish(TaskOutcome::SpawnFailed { reason });
            }
        }

        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Arc<TaskEntry>> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RundeckError::NotFound(id.to_string()))
    }

    /// Request termination. Succeeds for any known task, whatever its state.
    pub fn stop(&self, id: &str) -> Result<()> {
        let entry = self.get(id)?;
        entry.terminate();
        Ok(())
    }

    pub fn subscribe(&self, id: &str) -> Result<ChunkStream> {
        Ok(self.get(id)?.subscribe())
    }

    /// Remove a task if it has finished and nobody is watching it.
    pub fn reap(&self, id: &str) -> bool {
        let mut tasks = self.write();
        let reapable = tasks.get(id).is_some_and(|t| t.is_reapable());
        if reapable {
            tasks.remove(id);
            debug!(task_id = id, "task reaped");
        }
        reapable
    }

    /// Remove every reapable task that finished at least `retention` ago.
    pub fn reap_expired(&self, retention: Duration) -> usize {
        let mut tasks = self.write();
        let before = tasks.len();
        tasks.retain(|_, t| !(t.is_reapable() && t.finished_longer_than(retention)));
        let removed = before - tasks.len();
        if removed > 0 {
            debug!(removed, remaining = tasks.len(), "expired tasks reaped");
        }
        removed
    }

    /// Snapshots of all known tasks, oldest first.
    pub fn list(&self) -> Vec<TaskSnapshot> {
        let entries: Vec<Arc<TaskEntry>> = self.read().values().cloned().collect();
        let mut snapshots: Vec<TaskSnapshot> = entries.iter().map(|t| t.snapshot()).collect();
        snapshots.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.task_id.as_str().cmp(b.task_id.as_str()))
        });
        snapshots
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn running_count(&self) -> usize {
        self.read()
            .values()
            .filter(|t| !t.state().is_terminal())
            .count()
    }

    /// Ask every unfinished task to stop. Returns how many were signalled.
    pub fn terminate_all(&self) -> usize {
        let entries: Vec<Arc<TaskEntry>> = self.read().values().cloned().collect();
        let mut signalled = 0;
        for entry in entries {
            if !entry.state().is_terminal() {
                entry.terminate();
                signalled += 1;
            }
        }
        info!(signalled, "terminating all tasks");
        signalled
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::types::TaskState;

    fn registry(configure: impl FnOnce(&mut Settings)) -> Arc<TaskRegistry> {
        let mut settings = Settings::default();
        settings.execution.allow_arbitrary_command = true;
        configure(&mut settings);
        TaskRegistry::with_filesystem(settings, Arc::new(MockFileSystem::new()))
    }

    #[tokio::test]
    async fn invalid_target_registers_nothing() {
        let reg = registry(|_| {});
        let err = reg.create("command", "  ").unwrap_err();
        assert_eq!(err.code(), "empty_command");
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let reg = registry(|_| {});
        assert!(matches!(reg.get("nope"), Err(RundeckError::NotFound(_))));
        assert!(matches!(reg.stop("nope"), Err(RundeckError::NotFound(_))));
        assert!(matches!(reg.subscribe("nope"), Err(RundeckError::NotFound(_))));
        assert!(!reg.reap("nope"));
    }

    #[tokio::test]
    async fn spawn_failure_yields_failed_task() {
        let reg = registry(|s| s.execution.shell = "/nonexistent/rundeck-shell".into());
        let id = reg.create("command", "echo hi").unwrap();
        let task = reg.get(id.as_str()).unwrap();
        assert_eq!(task.state(), TaskState::Failed);
        assert!(task.broadcaster().is_closed());

        // Stop on a failed task still succeeds.
        reg.stop(id.as_str()).unwrap();
        assert!(reg.reap(id.as_str()));
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn busy_when_limit_reached() {
        let reg = registry(|s| s.execution.max_running_tasks = Some(1));
        let first = reg.create("command", "sleep 5").unwrap();
        let err = reg.create("command", "sleep 5").unwrap_err();
        assert!(matches!(err, RundeckError::Busy { limit: 1 }));

        reg.terminate_all();
        let mut stream = reg.subscribe(first.as_str()).unwrap();
        while stream.recv().await.is_some() {}
        assert_eq!(reg.running_count(), 0);
    }

    #[tokio::test]
    async fn reap_expired_keeps_recent_and_watched_tasks() {
        let reg = registry(|_| {});
        let watched = reg.create("command", "sleep 5").unwrap();
        let mut stream = reg.subscribe(watched.as_str()).unwrap();
        reg.stop(watched.as_str()).unwrap();
        // Drain but keep the stream alive.
        while stream.recv().await.is_some() {}
        assert!(reg.get(watched.as_str()).unwrap().state().is_terminal());

        let failing = registry(|s| s.execution.shell = "/nonexistent/rundeck-shell".into());
        let idle = failing.create("command", "true").unwrap();
        assert_eq!(failing.reap_expired(Duration::from_secs(3600)), 0);
        assert_eq!(failing.reap_expired(Duration::ZERO), 1);
        assert!(failing.get(idle.as_str()).is_err());

        assert_eq!(reg.reap_expired(Duration::ZERO), 0);
        drop(stream);
        assert_eq!(reg.reap_expired(Duration::ZERO), 1);
    }
}
