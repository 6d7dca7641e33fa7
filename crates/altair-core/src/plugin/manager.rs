//! Plugin manager
//!
//! Owns the registry of loaded plugins and orchestrates their lifecycle:
//! load → init → run (worker thread or host-loop updates) → stop → cleanup →
//! unload.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::hash::path_hash;
use crate::loader::{ModuleLoader, NativeLoader, SymbolAddress};
use crate::sync::{SyncFlag, SyncPoint};

use super::abi::UpdateFn;
use super::descriptor::Plugin;
use super::{PluginError, PluginInfo, PluginResult};

/// Plugin manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// How long to wait for an async plugin's worker to acknowledge exit
    pub teardown_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            teardown_timeout: Duration::from_secs(5),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker teardown timeout
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }
}

/// Registry of loaded plugins.
pub struct PluginManager {
    loader: Arc<dyn ModuleLoader>,
    registry: Mutex<Vec<Plugin>>,
    /// Host-loop exit signal
    sync: SyncPoint,
    config: ManagerConfig,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl PluginManager {
    /// Create a manager loading libraries through the platform loader.
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_loader(Arc::new(NativeLoader::new()), config)
    }

    /// Create a manager with a custom [`ModuleLoader`].
    pub fn with_loader(loader: Arc<dyn ModuleLoader>, config: ManagerConfig) -> Self {
        info!("Plugin manager initialized");
        Self {
            loader,
            registry: Mutex::new(Vec::new()),
            sync: SyncPoint::new(),
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        let uuid = path_hash(path.as_ref());
        self.registry.lock().iter().any(|plugin| plugin.uuid() == uuid)
    }

    /// Snapshot of every registered plugin, in insertion order.
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.registry
            .lock()
            .iter()
            .map(|plugin| plugin.info().clone())
            .collect()
    }

    /// Load, initialize and register the plugin at `path`.
    ///
    /// Asynchronous plugins have their worker started once they are in the
    /// registry. On failure nothing is left loaded and the registry is
    /// unchanged.
    pub fn register<P: AsRef<Path>>(&self, path: P) -> PluginResult<()> {
        let path = path.as_ref();

        if self.contains(path) {
            warn!("Plugin {:?} is already registered", path);
            return Err(PluginError::AlreadyRegistered(path.to_path_buf()));
        }

        let mut plugin = Plugin::load(self.loader.as_ref(), path).inspect_err(|e| {
            error!("Could not load plugin {:?}: {}", path, e);
        })?;

        if !plugin.initialize(self) {
            error!("Initialization of plugin {:?} failed", path);
            plugin.rollback(self.config.teardown_timeout);
            return Err(PluginError::InitFailed(path.to_path_buf()));
        }

        let mut registry = self.registry.lock();
        if registry.iter().any(|other| other.uuid() == plugin.uuid()) {
            // Lost a race with a concurrent registration of the same path.
            drop(registry);
            warn!("Plugin {:?} was registered concurrently", path);
            plugin.rollback(self.config.teardown_timeout);
            return Err(PluginError::AlreadyRegistered(path.to_path_buf()));
        }

        plugin.start();
        registry.push(plugin);
        drop(registry);

        info!("Plugin {:?} successfully registered", path);
        Ok(())
    }

    /// Stop, clean up and unload the plugin at `path`.
    ///
    /// If its worker does not exit in time the plugin stays registered.
    pub fn unregister<P: AsRef<Path>>(&self, path: P) -> PluginResult<()> {
        let path = path.as_ref();
        let uuid = path_hash(path);

        let mut registry = self.registry.lock();
        let Some(index) = registry.iter().position(|plugin| plugin.uuid() == uuid) else {
            error!("Plugin {:?} not found within registry; cannot unregister", path);
            return Err(PluginError::NotFound(path.to_path_buf()));
        };

        registry[index].stop(self.config.teardown_timeout)?;
        let plugin = registry.remove(index);
        let result = plugin.finish();
        drop(registry);

        if result.is_ok() {
            info!("Plugin {:?} unregistered", path);
        }
        result
    }

    /// Find a plugin by path. A `required` miss is logged as an error.
    pub fn query<P: AsRef<Path>>(&self, path: P, required: bool) -> Option<PluginInfo> {
        let path = path.as_ref();
        let uuid = path_hash(path);

        let found = self
            .registry
            .lock()
            .iter()
            .find(|plugin| plugin.uuid() == uuid)
            .map(|plugin| plugin.info().clone());

        if found.is_none() && required {
            error!("Plugin {:?} not found from registry", path);
        }
        found
    }

    /// Query, registering the plugin first if it is missing.
    ///
    /// Registers at most once before giving up.
    pub fn query_or_register<P: AsRef<Path>>(&self, path: P) -> PluginResult<PluginInfo> {
        let path = path.as_ref();

        for attempt in 0..2 {
            if let Some(info) = self.query(path, attempt > 0) {
                return Ok(info);
            }
            if attempt == 0 {
                self.register(path)?;
            }
        }
        Err(PluginError::NotFound(path.to_path_buf()))
    }

    /// Resolve an additional export of a registered plugin.
    pub fn symbol<P: AsRef<Path>>(&self, path: P, name: &str, required: bool) -> Option<SymbolAddress> {
        let path = path.as_ref();
        let uuid = path_hash(path);

        let mut registry = self.registry.lock();
        let Some(plugin) = registry.iter_mut().find(|plugin| plugin.uuid() == uuid) else {
            if required {
                error!("Cannot get symbol '{}' from unregistered plugin {:?}", name, path);
            }
            return None;
        };

        let address = plugin.symbol(name, required);
        if address.is_none() && required {
            error!("Symbol '{}' is not being exported by plugin {:?}", name, path);
        }
        address
    }

    /// Call `update(frame)` on every synchronous plugin.
    ///
    /// The registry lock is held for the whole pass, so plugins cannot be
    /// unloaded mid-update. Returns how many plugins were updated.
    pub fn update_all(&self, frame: u64) -> usize {
        let registry = self.registry.lock();
        let mut updated = 0;

        for plugin in registry.iter() {
            if let Some(status) = plugin.update(frame) {
                trace!("Plugin {:?} update({}) -> {}", plugin.info().path, frame, status);
                updated += 1;
            }
        }
        updated
    }

    /// Snapshot of `(uuid, update)` for every synchronous plugin.
    ///
    /// Calling the functions after the snapshot races with unregistration;
    /// prefer [`PluginManager::update_all`].
    pub fn update_targets(&self) -> Vec<(u64, UpdateFn)> {
        self.registry
            .lock()
            .iter()
            .filter_map(|plugin| plugin.update_fn().map(|update| (plugin.uuid(), update)))
            .collect()
    }

    /// Unregister every plugin. Plugins that fail to stop stay registered.
    pub fn shutdown(&self) -> PluginResult<()> {
        let mut registry = self.registry.lock();
        let mut first_error = None;
        let mut survivors = Vec::new();

        for mut plugin in registry.drain(..) {
            if let Err(e) = plugin.stop(self.config.teardown_timeout) {
                error!("Could not stop plugin {:?}: {}", plugin.info().path, e);
                first_error.get_or_insert(e);
                survivors.push(plugin);
                continue;
            }
            if let Err(e) = plugin.finish() {
                first_error.get_or_insert(e);
            }
        }
        *registry = survivors;

        match first_error {
            None => {
                debug!("All plugins unregistered");
                Ok(())
            }
            Some(e) => Err(e),
        }
    }

    /// Ask the host loop to stop.
    ///
    /// This is the only way to signal the host loop; its sync point is not
    /// reachable from outside the crate:
    ///
    /// ```compile_fail
    /// use altair_core::SyncFlag;
    /// use altair_core::plugin::{ManagerConfig, PluginManager};
    ///
    /// let manager = PluginManager::new(ManagerConfig::new());
    /// manager.sync().write_flag(SyncFlag::Start);
    /// ```
    pub fn request_exit(&self) {
        info!("Host loop exit requested");
        self.sync.signal(SyncFlag::Exit);
    }

    /// Consume a pending exit request.
    pub fn exit_requested(&self) -> bool {
        self.sync.read_flag_and_reset() == SyncFlag::Exit
    }

    /// Host-loop sync point
    pub(crate) fn sync(&self) -> &SyncPoint {
        &self.sync
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Plugin manager shutdown left plugins behind: {}", e);
        }
        info!("Plugin manager destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_config_default() {
        let config = ManagerConfig::default();
        assert_eq!(config.teardown_timeout, Duration::from_secs(5));

        let config = ManagerConfig::new().with_teardown_timeout(Duration::from_millis(250));
        assert_eq!(config.teardown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_exit_request_is_consumed_once() {
        let manager = PluginManager::default();
        assert!(!manager.exit_requested());

        manager.request_exit();
        assert!(manager.exit_requested());
        assert!(!manager.exit_requested());
    }

    #[test]
    fn test_register_missing_library_leaves_registry_empty() {
        let manager = PluginManager::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.so");

        let result = manager.register(&path);
        assert!(matches!(result, Err(PluginError::Loader(_))));
        assert!(manager.is_empty());
        assert!(manager.query(&path, false).is_none());
    }

    #[test]
    fn test_unregister_unknown_plugin() {
        let manager = PluginManager::default();
        let result = manager.unregister("/nowhere/plugin.so");
        assert!(matches!(result, Err(PluginError::NotFound(_))));
    }

    #[test]
    fn test_empty_manager_has_no_update_targets() {
        let manager = PluginManager::default();
        assert_eq!(manager.update_all(1), 0);
        assert!(manager.update_targets().is_empty());
        assert!(manager.shutdown().is_ok());
    }
}
