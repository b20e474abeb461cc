// src/stream/chunk.rs

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::types::TaskId;

/// Where a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Stdout,
    Stderr,
    /// Notices generated by rundeck itself (e.g. exit status).
    System,
    /// Failures of rundeck itself (e.g. spawn failure).
    Error,
}

/// One immutable unit of task output.
///
/// `seq` is assigned by the broadcaster at publish time and is strictly
/// increasing within a task, starting at 0. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub task_id: TaskId,
    pub seq: u64,
    pub kind: ChunkKind,
    pub text: Arc<str>,
}

impl Chunk {
    /// Bytes counted against the broadcaster's log budget.
    pub(crate) fn weight(&self) -> usize {
        self.text.len()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
