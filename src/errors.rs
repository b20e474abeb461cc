// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RundeckError {
    /// The run request does not name something we are willing to execute.
    ///
    /// `code` is a stable machine-readable tag (e.g. `empty_command`,
    /// `not_executable`) that the API forwards to clients.
    #[error("{message}")]
    InvalidTarget { code: &'static str, message: String },

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Too many running tasks (limit {limit})")]
    Busy { limit: usize },

    #[error("Failed to start process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RundeckError {
    pub fn invalid_target(code: &'static str, message: impl Into<String>) -> Self {
        RundeckError::InvalidTarget {
            code,
            message: message.into(),
        }
    }

    /// Stable error code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RundeckError::InvalidTarget { code, .. } => code,
            RundeckError::NotFound(_) => "not_found",
            RundeckError::Busy { .. } => "busy",
            RundeckError::Spawn(_) => "spawn_failed",
            RundeckError::ConfigError(_) => "config",
            RundeckError::IoError(_) => "io",
            RundeckError::TomlError(_) => "toml",
            RundeckError::Other(_) => "internal",
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, RundeckError>;
