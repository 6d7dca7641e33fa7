//! CLI definition using clap

use std::path::PathBuf;

use altair_core::config::{ConfigResult, RuntimeConfig};
use clap::Parser;

/// Altair - native plugin host with hot reload
#[derive(Debug, Parser)]
#[command(name = "altair")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory watched for plugins [default: plugins/ beside the executable]
    #[arg(value_name = "PLUGIN_DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Configuration file path (yaml, toml, json, ini, ron, json5)
    #[arg(short = 'c', long, env = "ALTAIR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deepest directory level watched; the plugin directory is level 1
    #[arg(short = 'd', long)]
    pub max_depth: Option<u32>,

    /// Shell glob matched against plugin file names
    #[arg(short = 'f', long)]
    pub filter: Option<String>,

    /// Watcher poll interval in milliseconds
    #[arg(short = 'p', long = "poll-ms")]
    pub poll_ms: Option<u64>,

    /// Run this many host frames, then exit
    #[arg(long)]
    pub frames: Option<u64>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Layer command-line overrides on top of file and environment settings.
    pub fn resolve_config(&self) -> ConfigResult<RuntimeConfig> {
        let mut config = RuntimeConfig::load(self.config.as_deref())?;

        if let Some(dir) = &self.plugin_dir {
            config.plugin_dir = dir.clone();
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(filter) = &self.filter {
            config.filter = filter.clone();
        }
        if let Some(poll_ms) = self.poll_ms {
            config.poll_interval_ms = poll_ms;
        }

        config.validate()?;
        Ok(config)
    }
}
