// src/exec/target.rs

//! Turning a `{mode, value}` run request into something we can spawn.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::ExecutionSettings;
use crate::errors::{Result, RundeckError};
use crate::fs::FileSystem;
use crate::types::TaskMode;

/// Characters that let a command line escape its whitelisted prefix once it
/// reaches the shell.
const SHELL_CONTROL_CHARS: &[char] = &[
    ';', '&', '|', '$', '`', '<', '>', '(', ')', '{', '}', '\n', '\r',
];

/// A validated execution target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Canonical path of an executable script inside the allowed root.
    Script(PathBuf),
    /// Command line to hand to `<shell> -c`.
    Command { shell: String, line: String },
}

impl ResolvedTarget {
    pub fn mode(&self) -> TaskMode {
        match self {
            ResolvedTarget::Script(_) => TaskMode::Script,
            ResolvedTarget::Command { .. } => TaskMode::Command,
        }
    }

    /// Build the process command with stdio wired for capture.
    pub fn to_command(&self) -> Command {
        let mut cmd = match self {
            ResolvedTarget::Script(path) => Command::new(path),
            ResolvedTarget::Command { shell, line } => {
                let mut c = Command::new(shell);
                c.arg("-c").arg(line);
                c
            }
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so termination reaches grandchildren too.
        #[cfg(unix)]
        cmd.process_group(0);

        cmd
    }
}

impl fmt::Display for ResolvedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedTarget::Script(path) => write!(f, "{}", path.display()),
            ResolvedTarget::Command { line, .. } => f.write_str(line),
        }
    }
}

/// Validate a run request.
///
/// `mode` is taken as a raw string so that an unknown mode is reported the
/// same way as any other bad target.
pub fn resolve_target(
    mode: &str,
    value: &str,
    settings: &ExecutionSettings,
    fs: &dyn FileSystem,
) -> Result<ResolvedTarget> {
    let mode: TaskMode = mode
        .parse()
        .map_err(|e: String| RundeckError::invalid_target("invalid_mode", e))?;

    let target = match mode {
        TaskMode::Script => resolve_script(value, settings, fs)?,
        TaskMode::Command => resolve_command(value, settings)?,
    };
    debug!(%mode, target = %target, "run target resolved");
    Ok(target)
}

fn resolve_script(
    value: &str,
    settings: &ExecutionSettings,
    fs: &dyn FileSystem,
) -> Result<ResolvedTarget> {
    let raw = value.trim();
    let requested = if raw.is_empty() {
        settings.default_script.clone().ok_or_else(|| {
            RundeckError::invalid_target(
                "empty_script",
                "Script path is empty and no default script is configured",
            )
        })?
    } else {
        PathBuf::from(raw)
    };

    let path = fs.canonicalize(&requested).map_err(|_| {
        RundeckError::invalid_target(
            "not_a_file",
            format!("Script {} does not exist", requested.display()),
        )
    })?;

    let root = fs.canonicalize(&settings.allowed_script_root).map_err(|_| {
        RundeckError::invalid_target(
            "path_not_allowed",
            format!(
                "Allowed script root {} does not exist",
                settings.allowed_script_root.display()
            ),
        )
    })?;

    // Component-wise, so `/srv/scripts-old` is not inside `/srv/scripts`.
    if !path.starts_with(&root) {
        return Err(RundeckError::invalid_target(
            "path_not_allowed",
            "Script path outside allowed root",
        ));
    }
    if !fs.is_file(&path) {
        return Err(RundeckError::invalid_target(
            "not_a_file",
            "Script path is not a file",
        ));
    }
    if !fs.is_executable(&path) {
        return Err(RundeckError::invalid_target(
            "not_executable",
            "Script is not executable",
        ));
    }

    Ok(ResolvedTarget::Script(path))
}

fn resolve_command(value: &str, settings: &ExecutionSettings) -> Result<ResolvedTarget> {
    let line = value.trim();
    if line.is_empty() {
        return Err(RundeckError::invalid_target(
            "empty_command",
            "Command is empty",
        ));
    }

    if !settings.allow_arbitrary_command && !is_whitelisted(line, &settings.command_whitelist) {
        return Err(RundeckError::invalid_target(
            "command_not_allowed",
            "Command not permitted in controlled mode",
        ));
    }

    Ok(ResolvedTarget::Command {
        shell: settings.shell.clone(),
        line: line.to_string(),
    })
}

/// A command is allowed when it starts with a whitelist entry that ends at a
/// word boundary, and contains nothing the shell would treat as control flow.
fn is_whitelisted(line: &str, whitelist: &[String]) -> bool {
    if line.contains(SHELL_CONTROL_CHARS) {
        return false;
    }
    whitelist.iter().any(|prefix| {
        line.strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    })
}
