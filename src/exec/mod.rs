// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`target`] validates run requests and builds the `tokio::process::Command`.
//! - [`runner`] spawns and supervises one process: it streams stdout/stderr
//!   line by line into the task's broadcaster, handles stop requests with a
//!   SIGTERM → SIGKILL escalation, and reports a single [`TaskOutcome`].
//!
//! [`TaskOutcome`]: crate::types::TaskOutcome

pub mod runner;
pub mod target;

pub use runner::{describe_outcome, ProcessRunner};
pub use target::{resolve_target, ResolvedTarget};
