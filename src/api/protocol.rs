// src/api/protocol.rs

//! JSON bodies exchanged with the browser.

use serde::{Deserialize, Serialize};

use crate::registry::TaskSnapshot;
use crate::types::TaskId;

/// Body of `POST /api/run`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// `script` or `command`; validated by the registry so that unknown
    /// modes get the same error shape as other bad targets.
    pub mode: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub success: bool,
    pub task_id: TaskId,
}

/// Body of a successful `POST /api/stop/{task_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    pub success: bool,
    pub task: TaskSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    pub success: bool,
    pub tasks: Vec<TaskSnapshot>,
}

/// Every failed request answers with this shape.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
