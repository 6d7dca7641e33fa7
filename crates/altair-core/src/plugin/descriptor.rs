//! Plugin descriptor: one loaded library bound to the plugin contract

use std::ffi::c_void;
use std::path::Path;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::hash::path_hash;
use crate::loader::{DynamicLibrary, ModuleLoader, SymbolAddress};
use crate::sync::{Launch, ThreadError, WorkerThread};

use super::abi::{
    CLEANUP_SYMBOL, CleanupFn, INIT_SYMBOL, InitFn, PROC_SYMBOL, PluginHost, PluginTask, ProcFn,
    TYPE_SYMBOL, UPDATE_SYMBOL, UpdateFn,
};
use super::{Capabilities, PluginError, PluginInfo, PluginManager, PluginResult, PluginState};

/// How the host drives a plugin; fixed at load time by the `ASYNC` bit.
pub(crate) enum Dispatch {
    /// Polled by the host loop once per frame
    Synchronous { update: Option<UpdateFn> },
    /// Runs `proc` on its own worker thread
    Asynchronous { worker: WorkerThread },
}

pub(crate) struct Plugin {
    info: PluginInfo,
    library: DynamicLibrary,
    init: Option<InitFn>,
    cleanup: Option<CleanupFn>,
    dispatch: Dispatch,
}

/// SHA-256 of a file's contents, hex encoded.
pub(crate) fn file_digest(path: &Path) -> Option<String> {
    let contents = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Some(format!("{:x}", hasher.finalize()))
}

/// Reinterpret an export as an entry point of type `F`.
///
/// # Safety
/// The export must actually be a function with signature `F`.
unsafe fn entry_point<F: Copy>(address: SymbolAddress) -> F {
    debug_assert_eq!(size_of::<F>(), size_of::<*mut c_void>());
    let ptr = address.as_ptr();
    unsafe { std::mem::transmute_copy::<*mut c_void, F>(&ptr) }
}

/// Release a library whose registration is being rolled back.
fn discard(library: DynamicLibrary) {
    if let Err(e) = library.unload() {
        warn!("Rollback could not unload library: {}", e);
    }
}

fn spawn_worker(info: &PluginInfo, entry: ProcFn) -> Result<WorkerThread, ThreadError> {
    let uuid = info.uuid;
    let path = info.path.clone();
    WorkerThread::spawn(
        format!("plugin-{:016x}", uuid),
        Launch::Suspended,
        move |worker| {
            let task = PluginTask::new(worker, uuid);
            // SAFETY: `proc` was resolved from a library that stays loaded
            // until this worker has been joined.
            let status = unsafe { entry(&task) };
            debug!("Plugin {:?} proc returned {}", path, status);
            worker.acknowledge_exit();
        },
    )
}

impl Plugin {
    /// Load a library and bind it to the plugin contract.
    ///
    /// On any failure the library is unloaded before returning.
    pub(crate) fn load(loader: &dyn ModuleLoader, path: &Path) -> PluginResult<Self> {
        let mut library = DynamicLibrary::load_with(loader, path)?;

        let Some(type_address) = library.resolve_symbol(TYPE_SYMBOL, true) else {
            error!("Can't find required 'type' from plugin {:?}", path);
            discard(library);
            return Err(PluginError::MissingSymbol {
                path: path.to_path_buf(),
                symbol: TYPE_SYMBOL,
            });
        };
        // SAFETY: the contract defines `type` as an exported `u32`.
        let bits = unsafe { *(type_address.as_ptr() as *const u32) };
        let capabilities = Capabilities::from_bits(bits);

        let info = PluginInfo {
            uuid: path_hash(path),
            path: path.to_path_buf(),
            capabilities,
            state: PluginState::Loaded,
            digest: file_digest(path),
        };

        let dispatch = if capabilities.is_async() {
            let Some(proc_address) = library.resolve_symbol(PROC_SYMBOL, true) else {
                error!(
                    "Can't find required 'proc' function for asynchronous plugin {:?}",
                    path
                );
                discard(library);
                return Err(PluginError::MissingSymbol {
                    path: path.to_path_buf(),
                    symbol: PROC_SYMBOL,
                });
            };
            // SAFETY: the contract defines `proc` as a `ProcFn`.
            let entry = unsafe { entry_point::<ProcFn>(proc_address) };

            match spawn_worker(&info, entry) {
                Ok(worker) => Dispatch::Asynchronous { worker },
                Err(source) => {
                    error!("Could not create thread for asynchronous plugin {:?}", path);
                    discard(library);
                    return Err(PluginError::Worker {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        } else {
            let update = library
                .resolve_symbol(UPDATE_SYMBOL, false)
                // SAFETY: the contract defines `update` as an `UpdateFn`.
                .map(|address| unsafe { entry_point::<UpdateFn>(address) });
            Dispatch::Synchronous { update }
        };

        // SAFETY (both): the contract defines the optional hooks' signatures.
        let init = library
            .resolve_symbol(INIT_SYMBOL, false)
            .map(|address| unsafe { entry_point::<InitFn>(address) });
        let cleanup = library
            .resolve_symbol(CLEANUP_SYMBOL, false)
            .map(|address| unsafe { entry_point::<CleanupFn>(address) });

        info!("Plugin {:?} loaded ({:?})", path, capabilities);
        Ok(Self {
            info,
            library,
            init,
            cleanup,
            dispatch,
        })
    }

    pub(crate) fn uuid(&self) -> u64 {
        self.info.uuid
    }

    pub(crate) fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub(crate) fn update_fn(&self) -> Option<UpdateFn> {
        match self.dispatch {
            Dispatch::Synchronous { update } => update,
            Dispatch::Asynchronous { .. } => None,
        }
    }

    /// Run the optional `init` hook. Plugins without one always succeed.
    pub(crate) fn initialize(&mut self, manager: &PluginManager) -> bool {
        if let Some(init) = self.init {
            let path = self.info.path.to_string_lossy();
            let host = PluginHost::new(manager, &self.info, &path);
            // SAFETY: `host` and everything it points at outlive the call;
            // `init` must not retain it.
            let ok = unsafe { init(&host) };
            if !ok {
                return false;
            }
        }
        self.info.state = PluginState::Initialized;
        true
    }

    /// Enter the running state, releasing the worker of an async plugin.
    pub(crate) fn start(&mut self) {
        if let Dispatch::Asynchronous { worker } = &self.dispatch {
            worker.start();
        }
        self.info.state = PluginState::Running;
    }

    /// Call `update` if this is a synchronous plugin exporting one.
    pub(crate) fn update(&self, frame: u64) -> Option<u32> {
        let update = self.update_fn()?;
        // SAFETY: the library stays loaded while the plugin is registered.
        Some(unsafe { update(frame) })
    }

    /// Resolve an additional export through the library's cache.
    pub(crate) fn symbol(&mut self, name: &str, required: bool) -> Option<SymbolAddress> {
        self.library.resolve_symbol(name, required)
    }

    /// Signal and join the worker of an async plugin.
    ///
    /// On timeout the worker is left untouched and the plugin stays usable.
    pub(crate) fn stop(&mut self, timeout: Duration) -> PluginResult<()> {
        if let Dispatch::Asynchronous { worker } = &mut self.dispatch {
            worker.destroy(timeout).map_err(|source| {
                error!(
                    "Could not destroy thread of asynchronous plugin {:?}",
                    self.info.path
                );
                PluginError::Worker {
                    path: self.info.path.clone(),
                    source,
                }
            })?;
        }
        self.info.state = PluginState::Stopped;
        Ok(())
    }

    /// Run `cleanup` and unload the library. Call after [`Plugin::stop`].
    pub(crate) fn finish(self) -> PluginResult<()> {
        let Plugin {
            info,
            library,
            cleanup,
            ..
        } = self;

        if let Some(cleanup) = cleanup {
            // SAFETY: the library is still loaded and no worker is running.
            if !unsafe { cleanup() } {
                warn!("Internal at-exit cleanup of plugin {:?} failed", info.path);
            }
        }

        library.unload().inspect_err(|_| {
            error!("Plugin {:?} failed to unload", info.path);
        })?;

        info!(
            "Plugin {:?} ({:#018x}) successfully unloaded",
            info.path, info.uuid
        );
        Ok(())
    }

    /// Undo a load whose registration did not complete. `cleanup` is not run
    /// because `init` never succeeded.
    pub(crate) fn rollback(mut self, timeout: Duration) {
        if let Err(e) = self.stop(timeout) {
            // The suspended worker could not be reaped; keep the library mapped.
            error!("Rollback of plugin {:?} leaked its worker: {}", self.info.path, e);
            std::mem::forget(self);
            return;
        }
        let Plugin { library, .. } = self;
        discard(library);
    }
}
