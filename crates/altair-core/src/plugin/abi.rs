//! Exported symbol names and entry-point signatures of the plugin contract.
//!
//! Everything handed to a plugin is `#[repr(C)]`: opaque host pointers plus
//! host-compiled `extern "C"` callbacks. A plugin links its own copy of this
//! crate, so it must never lock, wait on or notify host-side primitives
//! directly; every such operation goes through a callback and runs host code.

use std::ffi::c_void;
use std::path::Path;
use std::time::Duration;

use crate::sync::{AWAIT_FOREVER, WorkerContext};

use super::{Capabilities, PluginInfo, PluginManager};

pub const TYPE_SYMBOL: &str = "type";
pub const INIT_SYMBOL: &str = "init";
pub const PROC_SYMBOL: &str = "proc";
pub const UPDATE_SYMBOL: &str = "update";
pub const CLEANUP_SYMBOL: &str = "cleanup";

/// Called once after load. Returning false aborts registration.
///
/// The pointer is only valid for the duration of the call.
pub type InitFn = unsafe extern "C" fn(host: *const PluginHost) -> bool;

/// Body of an asynchronous plugin; runs on the plugin's worker thread and
/// must return promptly once [`PluginTask::should_exit`] reports true.
pub type ProcFn = unsafe extern "C" fn(task: *const PluginTask) -> u32;

/// Called once per host-loop iteration with a frame counter increasing by one.
pub type UpdateFn = unsafe extern "C" fn(frame: u64) -> u32;

/// Called once before the library is unloaded. Failure is logged only.
pub type CleanupFn = unsafe extern "C" fn() -> bool;

/// Milliseconds value meaning "wait indefinitely".
const WAIT_FOREVER_MS: u64 = u64::MAX;

fn millis(timeout: Duration) -> u64 {
    if timeout == AWAIT_FOREVER {
        return WAIT_FOREVER_MS;
    }
    u64::try_from(timeout.as_millis()).unwrap_or(WAIT_FOREVER_MS)
}

fn duration(timeout_ms: u64) -> Duration {
    if timeout_ms == WAIT_FOREVER_MS {
        AWAIT_FOREVER
    } else {
        Duration::from_millis(timeout_ms)
    }
}

/// Handed to an asynchronous plugin's `proc`.
#[repr(C)]
#[derive(Debug)]
pub struct PluginTask {
    /// Worker context, opaque to the plugin
    context: *const c_void,
    uuid: u64,
    should_exit: unsafe extern "C" fn(context: *const c_void) -> bool,
    wait_for_exit: unsafe extern "C" fn(context: *const c_void, timeout_ms: u64) -> bool,
}

impl PluginTask {
    pub(crate) fn new(worker: &WorkerContext, uuid: u64) -> Self {
        Self {
            context: worker as *const WorkerContext as *const c_void,
            uuid,
            should_exit: task_should_exit,
            wait_for_exit: task_wait_for_exit,
        }
    }

    /// Hash of the plugin's path
    pub fn uuid(&self) -> u64 {
        self.uuid
    }

    /// Consume any pending signal; true once the host wants the plugin to stop.
    pub fn should_exit(&self) -> bool {
        // SAFETY: the host keeps `context` alive while `proc` runs.
        unsafe { (self.should_exit)(self.context) }
    }

    /// Sleep for up to `timeout`, returning early (true) once the host wants
    /// the plugin to stop.
    pub fn wait_for_exit(&self, timeout: Duration) -> bool {
        // SAFETY: as above.
        unsafe { (self.wait_for_exit)(self.context, millis(timeout)) }
    }
}

unsafe extern "C" fn task_should_exit(context: *const c_void) -> bool {
    // SAFETY: `context` was built from a live `WorkerContext` by `PluginTask::new`.
    match unsafe { (context as *const WorkerContext).as_ref() } {
        Some(worker) => worker.should_exit(),
        None => true,
    }
}

unsafe extern "C" fn task_wait_for_exit(context: *const c_void, timeout_ms: u64) -> bool {
    // SAFETY: as in `task_should_exit`.
    match unsafe { (context as *const WorkerContext).as_ref() } {
        Some(worker) => worker.wait_for_exit(duration(timeout_ms)),
        None => true,
    }
}

/// Handed to a plugin's `init`: its own identity plus a narrow view of the
/// manager.
#[repr(C)]
#[derive(Debug)]
pub struct PluginHost {
    /// Plugin manager, opaque to the plugin
    manager: *const c_void,
    uuid: u64,
    capabilities: u32,
    path: *const u8,
    path_len: usize,
    is_registered: unsafe extern "C" fn(manager: *const c_void, path: *const u8, len: usize) -> bool,
    request_exit: unsafe extern "C" fn(manager: *const c_void),
}

impl PluginHost {
    /// `path` must be `info.path` as UTF-8 and outlive the returned value.
    pub(crate) fn new(manager: &PluginManager, info: &PluginInfo, path: &str) -> Self {
        Self {
            manager: manager as *const PluginManager as *const c_void,
            uuid: info.uuid,
            capabilities: info.capabilities.bits(),
            path: path.as_ptr(),
            path_len: path.len(),
            is_registered: host_is_registered,
            request_exit: host_request_exit,
        }
    }

    /// Hash of the plugin's path
    pub fn uuid(&self) -> u64 {
        self.uuid
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_bits(self.capabilities)
    }

    /// Path the plugin was loaded from (lossily converted to UTF-8).
    pub fn path(&self) -> &Path {
        // SAFETY: `path`/`path_len` describe a string the host keeps alive
        // for the duration of `init`.
        let bytes = unsafe { std::slice::from_raw_parts(self.path, self.path_len) };
        Path::new(std::str::from_utf8(bytes).unwrap_or_default())
    }

    /// Whether a plugin is registered under `path`.
    pub fn is_registered(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        // SAFETY: the host keeps `manager` alive for the duration of `init`.
        unsafe { (self.is_registered)(self.manager, path.as_ptr(), path.len()) }
    }

    /// Ask the host loop to stop.
    pub fn request_exit(&self) {
        // SAFETY: as above.
        unsafe { (self.request_exit)(self.manager) }
    }
}

unsafe extern "C" fn host_is_registered(manager: *const c_void, path: *const u8, len: usize) -> bool {
    // SAFETY: `manager` was built from a live `PluginManager` by
    // `PluginHost::new`; the plugin passes a valid UTF-8 slice.
    let Some(manager) = (unsafe { (manager as *const PluginManager).as_ref() }) else {
        return false;
    };
    if path.is_null() {
        return false;
    }
    let bytes = unsafe { std::slice::from_raw_parts(path, len) };
    match std::str::from_utf8(bytes) {
        Ok(path) => manager.contains(path),
        Err(_) => false,
    }
}

unsafe extern "C" fn host_request_exit(manager: *const c_void) {
    // SAFETY: as in `host_is_registered`.
    if let Some(manager) = unsafe { (manager as *const PluginManager).as_ref() } {
        manager.request_exit();
    }
}
