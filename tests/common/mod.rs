#![allow(dead_code)]

use std::sync::Arc;

use rundeck::config::Settings;
use rundeck::registry::TaskRegistry;

pub use rundeck_test_utils::{
    collect_chunks, init_tracing, texts, with_timeout, ScriptDir, SettingsBuilder,
};

/// Registry that accepts any command line.
pub fn open_registry() -> Arc<TaskRegistry> {
    registry(SettingsBuilder::new().allow_arbitrary_command(true).build())
}

pub fn registry(settings: Settings) -> Arc<TaskRegistry> {
    init_tracing();
    TaskRegistry::new(settings)
}
