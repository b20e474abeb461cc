use std::path::Path;

use rundeck::config::{RawSettings, Settings};
use rundeck::types::ReplayPolicy;

/// Builder for `Settings` to simplify test setup.
///
/// Starts from the built-in defaults with a short stop grace period so stop
/// tests finish quickly.
pub struct SettingsBuilder {
    raw: RawSettings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        let mut raw = RawSettings::default();
        raw.execution.stop_grace_period = "500ms".to_string();
        Self { raw }
    }

    pub fn allow_arbitrary_command(mut self, val: bool) -> Self {
        self.raw.execution.allow_arbitrary_command = val;
        self
    }

    pub fn whitelist(mut self, prefixes: &[&str]) -> Self {
        self.raw.execution.command_whitelist = prefixes.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn script_root(mut self, root: impl AsRef<Path>) -> Self {
        self.raw.execution.allowed_script_root = root.as_ref().to_path_buf();
        self
    }

    pub fn default_script(mut self, script: impl AsRef<Path>) -> Self {
        self.raw.execution.default_script = Some(script.as_ref().to_path_buf());
        self
    }

    pub fn shell(mut self, shell: &str) -> Self {
        self.raw.execution.shell = shell.to_string();
        self
    }

    pub fn stop_grace_period(mut self, duration: &str) -> Self {
        self.raw.execution.stop_grace_period = duration.to_string();
        self
    }

    pub fn max_running_tasks(mut self, limit: usize) -> Self {
        self.raw.execution.max_running_tasks = Some(limit);
        self
    }

    pub fn replay(mut self, replay: ReplayPolicy) -> Self {
        self.raw.stream.replay = replay;
        self
    }

    pub fn max_log_bytes(mut self, bytes: usize) -> Self {
        self.raw.stream.max_log_bytes = bytes;
        self
    }

    pub fn retention(mut self, duration: &str) -> Self {
        self.raw.registry.retention = duration.to_string();
        self
    }

    pub fn build(self) -> Settings {
        Settings::try_from(self.raw).expect("Failed to build valid settings from builder")
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
