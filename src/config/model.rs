// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::ReplayPolicy;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 8000
///
/// [execution]
/// allowed_script_root = "/srv/scripts"
/// command_whitelist = ["echo", "ls"]
/// stop_grace_period = "5s"
///
/// [stream]
/// replay = "buffered"
///
/// [registry]
/// retention = "5m"
/// ```
///
/// All sections are optional and have reasonable defaults. Durations are kept
/// as strings here and parsed during validation into [`Settings`].
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub execution: ExecutionSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub registry: RegistrySection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// `[execution]` section: what may run and how it is stopped.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionSection {
    /// Script used when a `script` request carries an empty value.
    #[serde(default)]
    pub default_script: Option<PathBuf>,

    /// Scripts must resolve to a path under this directory.
    #[serde(default = "default_allowed_script_root")]
    pub allowed_script_root: PathBuf,

    /// When false, commands must start with a whitelist entry.
    #[serde(default)]
    pub allow_arbitrary_command: bool,

    #[serde(default = "default_command_whitelist")]
    pub command_whitelist: Vec<String>,

    /// Shell used for `command` mode, invoked as `<shell> -c <command>`.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Time between SIGTERM and SIGKILL when stopping a task.
    #[serde(default = "default_stop_grace_period")]
    pub stop_grace_period: String,

    /// Upper bound on simultaneously running tasks; unlimited when absent.
    #[serde(default)]
    pub max_running_tasks: Option<usize>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_script: None,
            allowed_script_root: default_allowed_script_root(),
            allow_arbitrary_command: false,
            command_whitelist: default_command_whitelist(),
            shell: default_shell(),
            stop_grace_period: default_stop_grace_period(),
            max_running_tasks: None,
        }
    }
}

/// `[stream]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamSection {
    #[serde(default)]
    pub replay: ReplayPolicy,

    /// Per-task cap on retained output; oldest chunks are evicted first.
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: usize,

    /// Interval between SSE keep-alive comments.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            replay: ReplayPolicy::default(),
            max_log_bytes: default_max_log_bytes(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// `[registry]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrySection {
    /// How long a finished task stays addressable before it may be reaped.
    #[serde(default = "default_retention")]
    pub retention: String,

    #[serde(default = "default_reap_interval")]
    pub reap_interval: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            reap_interval: default_reap_interval(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_script_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_command_whitelist() -> Vec<String> {
    [
        "echo",
        "ls",
        "cat",
        "tail",
        "grep",
        "systemctl status",
        "journalctl -u",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_stop_grace_period() -> String {
    "5s".to_string()
}

fn default_max_log_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_keep_alive() -> String {
    "15s".to_string()
}

fn default_retention() -> String {
    "5m".to_string()
}

fn default_reap_interval() -> String {
    "30s".to_string()
}

/// Validated configuration used by the rest of the application.
///
/// Built from [`RawSettings`] via `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub execution: ExecutionSettings,
    pub stream: StreamSettings,
    pub registry: RegistrySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub default_script: Option<PathBuf>,
    pub allowed_script_root: PathBuf,
    pub allow_arbitrary_command: bool,
    pub command_whitelist: Vec<String>,
    pub shell: String,
    pub stop_grace_period: Duration,
    pub max_running_tasks: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub replay: ReplayPolicy,
    pub max_log_bytes: usize,
    pub keep_alive: Duration,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub retention: Duration,
    pub reap_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: default_host(),
                port: default_port(),
            },
            execution: ExecutionSettings {
                default_script: None,
                allowed_script_root: default_allowed_script_root(),
                allow_arbitrary_command: false,
                command_whitelist: default_command_whitelist(),
                shell: default_shell(),
                stop_grace_period: Duration::from_secs(5),
                max_running_tasks: None,
            },
            stream: StreamSettings {
                replay: ReplayPolicy::default(),
                max_log_bytes: default_max_log_bytes(),
                keep_alive: Duration::from_secs(15),
            },
            registry: RegistrySettings {
                retention: Duration::from_secs(5 * 60),
                reap_interval: Duration::from_secs(30),
            },
        }
    }
}
