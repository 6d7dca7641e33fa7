//! Glue between the file watcher, the plugin manager and the host loop

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::plugin::{PluginError, PluginManager, file_digest};
use crate::watcher::{FileEvent, FileWatcher, WatchEvent, WatcherResult};

/// A plugin file appeared: register it unless it already is.
pub fn on_add(event: &WatchEvent, manager: &PluginManager) {
    if event.is_directory() || manager.contains(&event.path) {
        return;
    }
    if let Err(e) = manager.register(&event.path) {
        warn!("Plugin {:?} could not be registered: {}", event.path, e);
    }
}

/// A plugin file disappeared: unregister it.
pub fn on_remove(event: &WatchEvent, manager: &PluginManager) {
    if !manager.contains(&event.path) {
        return;
    }
    if let Err(e) = manager.unregister(&event.path) {
        warn!("Plugin {:?} could not be unregistered: {}", event.path, e);
    }
}

/// A plugin file was rewritten: reload it.
///
/// Writes that leave the contents unchanged (such as the watcher's settle
/// touch on an already loaded plugin) do not trigger a reload.
pub fn on_modify(event: &WatchEvent, manager: &PluginManager) {
    if event.is_directory() {
        return;
    }

    if let Some(info) = manager.query(&event.path, false) {
        let digest = file_digest(&event.path);
        if digest.is_some() && digest == info.digest {
            debug!("Plugin {:?} unchanged; not reloading", event.path);
            return;
        }
        if let Err(e) = manager.unregister(&event.path) {
            warn!("Plugin {:?} could not be unloaded for reload: {}", event.path, e);
            return;
        }
        info!("Reloading plugin {:?}", event.path);
    }

    match manager.register(&event.path) {
        Ok(()) | Err(PluginError::AlreadyRegistered(_)) => {}
        Err(e) => warn!("Plugin {:?} could not be registered: {}", event.path, e),
    }
}

/// Subscribe the built-in handlers so the watcher drives `manager`.
pub fn attach(watcher: &FileWatcher, manager: &Arc<PluginManager>) -> WatcherResult<()> {
    watcher.add_callback(on_add, FileEvent::ADDED, manager.clone())?;
    watcher.add_callback(on_remove, FileEvent::REMOVED, manager.clone())?;
    watcher.add_callback(on_modify, FileEvent::MODIFIED, manager.clone())?;
    Ok(())
}

/// Drives synchronous plugins once per frame.
#[derive(Debug)]
pub struct HostLoop {
    manager: Arc<PluginManager>,
    frame: u64,
    frame_interval: Option<Duration>,
}

impl HostLoop {
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self {
            manager,
            frame: 0,
            frame_interval: None,
        }
    }

    /// Sleep between frames
    pub fn with_frame_interval(mut self, interval: Option<Duration>) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Frames run so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    fn step(&mut self) {
        self.manager.update_all(self.frame);
        self.frame += 1;
        if let Some(interval) = self.frame_interval {
            thread::sleep(interval);
        }
    }

    /// Run until [`PluginManager::request_exit`] is called. Returns the
    /// number of frames run.
    pub fn run(&mut self) -> u64 {
        info!("Host loop running");
        let start = self.frame;
        while !self.manager.exit_requested() {
            self.step();
        }
        info!("Host loop exiting after {} frames", self.frame - start);
        self.frame - start
    }

    /// Run exactly `frames` frames, stopping early on an exit request.
    pub fn run_frames(&mut self, frames: u64) -> u64 {
        let start = self.frame;
        for _ in 0..frames {
            if self.manager.exit_requested() {
                break;
            }
            self.step();
        }
        self.frame - start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_run_frames_counts_from_zero() {
        let manager = Arc::new(PluginManager::default());
        let mut host = HostLoop::new(manager);

        assert_eq!(host.run_frames(3), 3);
        assert_eq!(host.frame(), 3);
    }

    #[test]
    fn test_run_stops_on_exit_request() {
        let manager = Arc::new(PluginManager::default());
        manager.request_exit();

        let mut host = HostLoop::new(manager.clone());
        assert_eq!(host.run(), 0);

        manager.request_exit();
        assert_eq!(host.run_frames(5), 0);
        assert_eq!(host.run_frames(2), 2);
    }

    #[test]
    fn test_handlers_ignore_directories_and_unknown_paths() {
        let manager = PluginManager::default();
        let dir = tempfile::tempdir().unwrap();

        on_add(
            &WatchEvent::new(FileEvent::ADDED | FileEvent::DIRECTORY, dir.path().to_path_buf()),
            &manager,
        );
        on_remove(
            &WatchEvent::new(FileEvent::REMOVED, PathBuf::from("/nowhere/gone.so")),
            &manager,
        );
        assert!(manager.is_empty());
    }
}
