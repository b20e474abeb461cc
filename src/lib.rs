// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod registry;
pub mod stream;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{format_duration, load_settings, Settings};
use crate::registry::{spawn_reaper, TaskRegistry};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings (file, environment, CLI overrides)
/// - the task registry and its reaper
/// - the HTTP server
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let mut settings = load_settings(args.config.as_deref().map(Path::new))?;
    if let Some(host) = args.host {
        settings.server.host = host;
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let host = settings.server.host.clone();
    let port = settings.server.port;
    info!(
        allow_arbitrary_command = settings.execution.allow_arbitrary_command,
        replay = ?settings.stream.replay,
        "starting rundeck"
    );

    let registry = TaskRegistry::new(settings);
    let _reaper = spawn_reaper(&registry);

    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;

    api::serve(listener, registry, shutdown_signal()).await?;
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed we keep running.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

/// Print the effective settings.
fn print_dry_run(settings: &Settings) {
    let exec = &settings.execution;
    println!("rundeck dry-run");
    println!("  server = {}:{}", settings.server.host, settings.server.port);
    println!();

    println!("execution:");
    match exec.default_script {
        Some(ref script) => println!("  default_script: {}", script.display()),
        None => println!("  default_script: (none)"),
    }
    println!("  allowed_script_root: {}", exec.allowed_script_root.display());
    println!("  allow_arbitrary_command: {}", exec.allow_arbitrary_command);
    if !exec.allow_arbitrary_command {
        println!("  command_whitelist: {:?}", exec.command_whitelist);
    }
    println!("  shell: {}", exec.shell);
    println!("  stop_grace_period: {}", format_duration(exec.stop_grace_period));
    if let Some(limit) = exec.max_running_tasks {
        println!("  max_running_tasks: {limit}");
    }
    println!();

    println!("stream:");
    println!("  replay: {:?}", settings.stream.replay);
    println!("  max_log_bytes: {}", settings.stream.max_log_bytes);
    println!("  keep_alive: {}", format_duration(settings.stream.keep_alive));
    println!();

    println!("registry:");
    println!("  retention: {}", format_duration(settings.registry.retention));
    println!("  reap_interval: {}", format_duration(settings.registry.reap_interval));

    debug!("dry-run complete (server not started)");
}
