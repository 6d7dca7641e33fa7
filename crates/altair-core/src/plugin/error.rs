//! Typed errors for the plugin sub-system.

use std::path::PathBuf;

use thiserror::Error;

use crate::loader::LoaderError;
use crate::sync::ThreadError;

/// Errors that can occur during plugin lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PluginError {
    /// The library could not be loaded or released.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// A symbol the plugin contract requires is not exported.
    #[error("Plugin {} does not export required symbol '{symbol}'", .path.display())]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    /// The plugin's `init` returned false.
    #[error("Initialization of plugin {} failed", .0.display())]
    InitFailed(PathBuf),

    /// Creating, starting or stopping an asynchronous plugin's worker failed.
    #[error("Worker thread of plugin {} failed: {source}", .path.display())]
    Worker {
        path: PathBuf,
        #[source]
        source: ThreadError,
    },

    /// A plugin with the same path hash is already registered.
    #[error("Plugin {} is already registered", .0.display())]
    AlreadyRegistered(PathBuf),

    /// No plugin with this path hash is registered.
    #[error("Plugin {} not found within registry", .0.display())]
    NotFound(PathBuf),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
