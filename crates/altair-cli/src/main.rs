//! Altair host - watches a plugin directory and runs what it finds

mod cli;

use std::sync::Arc;

use altair_core::config::RuntimeConfig;
use altair_core::host::{self, HostLoop};
use altair_core::plugin::PluginManager;
use altair_core::watcher::FileWatcher;
use anyhow::Context;
use clap::Parser;
use cli::Cli;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.resolve_config().context("Invalid configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    run(&config, cli.frames)
}

fn run(config: &RuntimeConfig, frames: Option<u64>) -> anyhow::Result<()> {
    if !config.plugin_dir.exists() {
        info!("Creating plugin directory {:?}", config.plugin_dir);
        std::fs::create_dir_all(&config.plugin_dir)
            .with_context(|| format!("Could not create {:?}", config.plugin_dir))?;
    }

    let manager = Arc::new(PluginManager::new(config.manager_config()));

    // Callbacks go in before the watcher thread runs, so plugins already in
    // the directory are picked up by its first settle pass.
    let mut watcher = FileWatcher::create_suspended(config.watcher_config())
        .with_context(|| format!("Could not watch {:?}", config.plugin_dir))?;
    host::attach(&watcher, &manager)?;
    watcher.start();

    watch_ctrl_c(manager.clone())?;

    let mut host = HostLoop::new(manager.clone()).with_frame_interval(config.frame_interval());
    let ran = match frames {
        Some(frames) => host.run_frames(frames),
        None => host.run(),
    };
    info!("Host loop ran {} frames", ran);

    watcher
        .destroy(config.teardown_timeout())
        .context("File watcher did not stop")?;
    if let Err(e) = manager.shutdown() {
        warn!("Some plugins could not be stopped: {}", e);
    }
    Ok(())
}

/// Request a host-loop exit on Ctrl-C.
fn watch_ctrl_c(manager: Arc<PluginManager>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => manager.request_exit(),
                    Err(e) => warn!("Could not listen for Ctrl-C: {}", e),
                }
            });
        })?;
    Ok(())
}
