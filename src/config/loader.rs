// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawSettings, Settings};
use crate::errors::{Result, RundeckError};
use crate::types::ReplayPolicy;

/// Load a configuration file from a given path and return the raw `RawSettings`.
///
/// This only performs TOML deserialization; it does **not** parse durations or
/// check limits. Use [`load_settings`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawSettings = toml::from_str(&contents)?;

    Ok(config)
}

/// Resolve the effective settings.
///
/// - An explicit `path` must exist.
/// - Without one, [`default_config_path`] is used if present, otherwise the
///   built-in defaults.
/// - `RUNDECK_*` environment variables are applied on top (see
///   [`apply_env_overrides`]) before validation.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut raw = match path {
        Some(p) => load_from_path(p)?,
        None => {
            let default = default_config_path();
            if default.is_file() {
                debug!(path = %default.display(), "loading default config file");
                load_from_path(&default)?
            } else {
                debug!("no config file found; using built-in defaults");
                RawSettings::default()
            }
        }
    };

    apply_env_overrides(&mut raw, |key| std::env::var(key).ok())?;
    Settings::try_from(raw)
}

/// Apply `RUNDECK_*` overrides using `lookup` to read variables.
///
/// Taking the lookup as a closure keeps this testable without mutating the
/// process environment.
pub fn apply_env_overrides<F>(raw: &mut RawSettings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("RUNDECK_HOST") {
        raw.server.host = host;
    }
    if let Some(port) = lookup("RUNDECK_PORT") {
        raw.server.port = port.trim().parse().map_err(|e| {
            RundeckError::ConfigError(format!("RUNDECK_PORT: invalid port {port:?}: {e}"))
        })?;
    }
    if let Some(script) = lookup("RUNDECK_DEFAULT_SCRIPT") {
        raw.execution.default_script = Some(PathBuf::from(script));
    }
    if let Some(root) = lookup("RUNDECK_ALLOWED_SCRIPT_ROOT") {
        raw.execution.allowed_script_root = PathBuf::from(root);
    }
    if let Some(flag) = lookup("RUNDECK_ALLOW_ARBITRARY_COMMAND") {
        raw.execution.allow_arbitrary_command = parse_bool("RUNDECK_ALLOW_ARBITRARY_COMMAND", &flag)?;
    }
    if let Some(list) = lookup("RUNDECK_COMMAND_WHITELIST") {
        raw.execution.command_whitelist = list
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(replay) = lookup("RUNDECK_REPLAY") {
        raw.stream.replay = replay
            .parse::<ReplayPolicy>()
            .map_err(|e| RundeckError::ConfigError(format!("RUNDECK_REPLAY: {e}")))?;
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(RundeckError::ConfigError(format!(
            "{key}: expected a boolean, got {other:?}"
        ))),
    }
}

/// Default config location: `Rundeck.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Rundeck.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut raw = RawSettings::default();
        apply_env_overrides(
            &mut raw,
            env(&[
                ("RUNDECK_PORT", "9100"),
                ("RUNDECK_ALLOW_ARBITRARY_COMMAND", "yes"),
                ("RUNDECK_COMMAND_WHITELIST", "uptime, df -h ,,"),
                ("RUNDECK_REPLAY", "none"),
            ]),
        )
        .unwrap();

        assert_eq!(raw.server.port, 9100);
        assert!(raw.execution.allow_arbitrary_command);
        assert_eq!(raw.execution.command_whitelist, vec!["uptime", "df -h"]);
        assert_eq!(raw.stream.replay, ReplayPolicy::None);
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let mut raw = RawSettings::default();
        let err = apply_env_overrides(&mut raw, env(&[("RUNDECK_PORT", "http")])).unwrap_err();
        assert!(matches!(err, RundeckError::ConfigError(msg) if msg.contains("RUNDECK_PORT")));
    }

    #[test]
    fn unset_variables_leave_defaults() {
        let mut raw = RawSettings::default();
        apply_env_overrides(&mut raw, env(&[])).unwrap();
        assert_eq!(raw.server.port, 8000);
        assert!(!raw.execution.allow_arbitrary_command);
    }
}
