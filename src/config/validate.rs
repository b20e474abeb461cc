// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    ExecutionSettings, RawSettings, RegistrySettings, ServerSettings, Settings, StreamSettings,
};
use crate::errors::{Result, RundeckError};

impl TryFrom<RawSettings> for Settings {
    type Error = RundeckError;

    fn try_from(raw: RawSettings) -> std::result::Result<Self, Self::Error> {
        let stop_grace_period = positive_duration(
            "[execution].stop_grace_period",
            &raw.execution.stop_grace_period,
        )?;
        let keep_alive = positive_duration("[stream].keep_alive", &raw.stream.keep_alive)?;
        let retention = duration("[registry].retention", &raw.registry.retention)?;
        let reap_interval =
            positive_duration("[registry].reap_interval", &raw.registry.reap_interval)?;

        validate_execution(&raw)?;

        if raw.stream.max_log_bytes == 0 {
            return Err(RundeckError::ConfigError(
                "[stream].max_log_bytes must be >= 1 (got 0)".to_string(),
            ));
        }

        let command_whitelist = raw
            .execution
            .command_whitelist
            .iter()
            .map(|entry| entry.trim().to_string())
            .collect();

        Ok(Settings {
            server: ServerSettings {
                host: raw.server.host,
                port: raw.server.port,
            },
            execution: ExecutionSettings {
                default_script: raw.execution.default_script,
                allowed_script_root: raw.execution.allowed_script_root,
                allow_arbitrary_command: raw.execution.allow_arbitrary_command,
                command_whitelist,
                shell: raw.execution.shell,
                stop_grace_period,
                max_running_tasks: raw.execution.max_running_tasks,
            },
            stream: StreamSettings {
                replay: raw.stream.replay,
                max_log_bytes: raw.stream.max_log_bytes,
                keep_alive,
            },
            registry: RegistrySettings {
                retention,
                reap_interval,
            },
        })
    }
}

fn validate_execution(cfg: &RawSettings) -> Result<()> {
    if cfg.execution.shell.trim().is_empty() {
        return Err(RundeckError::ConfigError(
            "[execution].shell must not be empty".to_string(),
        ));
    }

    if let Some(pos) = cfg
        .execution
        .command_whitelist
        .iter()
        .position(|entry| entry.trim().is_empty())
    {
        return Err(RundeckError::ConfigError(format!(
            "[execution].command_whitelist entry #{} is blank",
            pos + 1
        )));
    }

    if cfg.execution.max_running_tasks == Some(0) {
        return Err(RundeckError::ConfigError(
            "[execution].max_running_tasks must be >= 1 (got 0); omit it for no limit"
                .to_string(),
        ));
    }

    Ok(())
}

fn duration(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| RundeckError::ConfigError(format!("{field}: {e}")))
}

fn positive_duration(field: &str, value: &str) -> Result<Duration> {
    let d = duration(field, value)?;
    if d.is_zero() {
        return Err(RundeckError::ConfigError(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let settings = Settings::try_from(RawSettings::default()).unwrap();
        assert_eq!(settings.execution.stop_grace_period, Duration::from_secs(5));
        assert_eq!(settings.registry.retention, Duration::from_secs(300));
        assert_eq!(settings.stream.max_log_bytes, 5 * 1024 * 1024);
    }

    #[test]
    fn zero_grace_period_is_rejected() {
        let mut raw = RawSettings::default();
        raw.execution.stop_grace_period = "0s".to_string();
        let err = Settings::try_from(raw).unwrap_err();
        assert!(matches!(err, RundeckError::ConfigError(msg) if msg.contains("stop_grace_period")));
    }

    #[test]
    fn zero_retention_is_allowed() {
        let mut raw = RawSettings::default();
        raw.registry.retention = "0s".to_string();
        let settings = Settings::try_from(raw).unwrap();
        assert!(settings.registry.retention.is_zero());
    }

    #[test]
    fn blank_whitelist_entry_is_rejected() {
        let mut raw = RawSettings::default();
        raw.execution.command_whitelist.push("   ".to_string());
        assert!(matches!(
            Settings::try_from(raw),
            Err(RundeckError::ConfigError(msg)) if msg.contains("blank")
        ));
    }

    #[test]
    fn zero_task_limit_is_rejected() {
        let mut raw = RawSettings::default();
        raw.execution.max_running_tasks = Some(0);
        assert!(Settings::try_from(raw).is_err());
    }
}
