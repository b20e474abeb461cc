// src/config/mod.rs

//! Configuration loading and validation for rundeck.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply environment overrides (`loader.rs`).
//! - Turn raw values into typed, validated [`Settings`] (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::{format_duration, parse_duration};
pub use loader::{apply_env_overrides, default_config_path, load_from_path, load_settings};
pub use model::{
    ExecutionSection, ExecutionSettings, RawSettings, RegistrySection, RegistrySettings,
    ServerSection, ServerSettings, Settings, StreamSection, StreamSettings,
};
