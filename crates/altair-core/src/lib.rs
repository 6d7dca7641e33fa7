//! Altair: a native plugin-hosting runtime
//!
//! Discovers shared-library plugins in a watched directory tree, loads them
//! through a cached symbol loader, and manages their lifecycle. Plugins are
//! hot added, removed and reloaded as their files change. Plugins that ask
//! for it run on their own worker thread; the rest are updated once per frame
//! by the host loop.
//!
//! - [`loader`]: dynamic libraries with a per-library symbol cache
//! - [`sync`]: mutex, condition variable and one-slot signal flag, plus the
//!   worker-thread start/exit protocol built on them
//! - [`plugin`]: the plugin contract, descriptors and the [`PluginManager`]
//! - [`watcher`]: depth-bounded recursive file watcher
//! - [`host`]: handlers wiring the watcher to the manager, and the host loop
//! - [`config`]: layered runtime configuration

pub mod config;
pub mod hash;
pub mod host;
pub mod loader;
pub mod plugin;
pub mod sync;
pub mod watcher;

pub use config::RuntimeConfig;
pub use host::HostLoop;
pub use loader::{DynamicLibrary, LoaderError, ModuleImage, ModuleLoader, NativeLoader, SymbolAddress};
pub use plugin::{
    Capabilities, ManagerConfig, PluginError, PluginInfo, PluginManager, PluginResult,
    PluginHost, PluginState, PluginTask,
};
pub use sync::{SyncFlag, SyncPoint, WorkerContext, WorkerThread};
pub use watcher::{FileEvent, FileWatcher, WatchEvent, WatcherConfig, WatcherError};
