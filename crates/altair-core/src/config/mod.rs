//! Runtime configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. an optional file (YAML, TOML, JSON, INI, RON or JSON5, by extension)
//! 3. `ALTAIR_*` environment variables, e.g. `ALTAIR_MAX_DEPTH=3`
//!
//! Command-line overrides are applied by the binary on top of the result.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config as Cfg, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plugin::ManagerConfig;
use crate::watcher::WatcherConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ALTAIR";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Config parsing error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Detect configuration format from file extension
pub fn detect_format(path: &Path) -> ConfigResult<FileFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat("No file extension found".to_string()))?;

    match ext.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "toml" => Ok(FileFormat::Toml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
    }
}

/// `plugins/` beside the running executable.
pub fn default_plugin_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("plugins")))
        .unwrap_or_else(|| PathBuf::from("plugins"))
}

/// Shared-library filter matching versioned names such as `libfoo.so.1`.
pub fn default_filter() -> &'static str {
    if cfg!(windows) { "*.dll*" } else { "*.so*" }
}

/// Host runtime settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Directory watched for plugins
    pub plugin_dir: PathBuf,
    /// Deepest directory level watched; the plugin directory is level 1
    pub max_depth: u32,
    /// Shell glob matched against plugin file names
    pub filter: String,
    /// Watcher poll interval
    pub poll_interval_ms: u64,
    /// Wait bound for worker threads to exit
    pub teardown_timeout_ms: u64,
    /// Sleep between host-loop frames; 0 runs frames back to back
    pub frame_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            plugin_dir: default_plugin_dir(),
            max_depth: 2,
            filter: default_filter().to_string(),
            poll_interval_ms: 1000,
            teardown_timeout_ms: 5000,
            frame_interval_ms: 16,
        }
    }
}

impl RuntimeConfig {
    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = Cfg::builder().add_source(Cfg::try_from(&Self::default())?);

        if let Some(path) = path {
            let format = detect_format(path)?;
            debug!("Loading configuration from {:?}", path);
            builder = builder.add_source(File::from(path).format(format));
        }

        let config: Self = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse from a string, filling missing keys with defaults.
    pub fn from_str(content: &str, format: FileFormat) -> ConfigResult<Self> {
        let config: Self = Cfg::builder()
            .add_source(Cfg::try_from(&Self::default())?)
            .add_source(File::from_str(content, format))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid("max_depth must be at least 1".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.filter.is_empty() {
            return Err(ConfigError::Invalid("filter must not be empty".to_string()));
        }
        glob::Pattern::new(&self.filter)
            .map_err(|e| ConfigError::Invalid(format!("filter '{}': {}", self.filter, e)))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_interval_ms > 0).then(|| Duration::from_millis(self.frame_interval_ms))
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig::new(&self.plugin_dir)
            .with_max_depth(self.max_depth)
            .with_filter(&self.filter)
            .with_poll_interval(self.poll_interval())
            .with_teardown_timeout(self.teardown_timeout())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new().with_teardown_timeout(self.teardown_timeout())
    }
}
