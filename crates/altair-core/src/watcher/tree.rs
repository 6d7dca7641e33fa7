//! Watched directory tree
//!
//! Directories are watched non-recursively, one backend watch each, so that
//! the depth of every watch is known and bounded.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::error::WatcherResult;
use super::event::{FileEvent, WatchEvent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchEntry {
    pub path: PathBuf,
    /// Root is depth 1
    pub depth: u32,
}

struct TreeState {
    backend: RecommendedWatcher,
    entries: Vec<WatchEntry>,
    /// Directories whose files have not been touched yet
    pending_settle: Vec<PathBuf>,
}

pub(crate) struct WatchTree {
    state: Mutex<TreeState>,
    max_depth: u32,
}

impl WatchTree {
    pub(crate) fn new(backend: RecommendedWatcher, max_depth: u32) -> Self {
        Self {
            state: Mutex::new(TreeState {
                backend,
                entries: Vec::new(),
                pending_settle: Vec::new(),
            }),
            max_depth,
        }
    }

    pub(crate) fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Watch `path` at `depth`, then every existing subdirectory within bounds.
    pub(crate) fn watch(&self, path: &Path, depth: u32) -> WatcherResult<()> {
        let mut state = self.state.lock();
        watch_locked(&mut state, path, depth, self.max_depth)
    }

    /// Stop watching `path` and everything below it.
    pub(crate) fn forget(&self, path: &Path) {
        let mut state = self.state.lock();
        let TreeState {
            backend,
            entries,
            ..
        } = &mut *state;

        entries.retain(|entry| {
            if !entry.path.starts_with(path) {
                return true;
            }
            // The backend may already have dropped a watch on a deleted directory.
            if let Err(e) = backend.unwatch(&entry.path) {
                debug!("Unwatch of {:?} failed: {}", entry.path, e);
            }
            info!("Stopped watching {:?}", entry.path);
            false
        });
    }

    pub(crate) fn depth_of(&self, path: &Path) -> Option<u32> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|entry| entry.path == path)
            .map(|entry| entry.depth)
    }

    pub(crate) fn is_watched(&self, path: &Path) -> bool {
        self.depth_of(path).is_some()
    }

    pub(crate) fn directories(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Touch the regular files of newly watched directories so that files
    /// present before the watch was added surface as `MODIFIED`.
    pub(crate) fn settle_pending(&self) {
        let pending = std::mem::take(&mut self.state.lock().pending_settle);

        for directory in pending {
            let Ok(read_dir) = std::fs::read_dir(&directory) else {
                continue;
            };
            for entry in read_dir.flatten() {
                let path = entry.path();
                if !entry.file_type().is_ok_and(|kind| kind.is_file()) {
                    continue;
                }
                if let Err(e) = OpenOptions::new().append(true).open(&path) {
                    debug!("Could not settle {:?}: {}", path, e);
                }
            }
        }
    }

    pub(crate) fn unwatch_all(&self) {
        let mut state = self.state.lock();
        let TreeState {
            backend,
            entries,
            pending_settle,
        } = &mut *state;

        for entry in entries.drain(..) {
            if let Err(e) = backend.unwatch(&entry.path) {
                debug!("Unwatch of {:?} failed: {}", entry.path, e);
            }
        }
        pending_settle.clear();
    }
}

fn watch_locked(state: &mut TreeState, path: &Path, depth: u32, max_depth: u32) -> WatcherResult<()> {
    if depth > max_depth || state.entries.iter().any(|entry| entry.path == path) {
        return Ok(());
    }

    state.backend.watch(path, RecursiveMode::NonRecursive)?;
    state.entries.push(WatchEntry {
        path: path.to_path_buf(),
        depth,
    });
    state.pending_settle.push(path.to_path_buf());
    info!("Watching {:?} (depth {})", path, depth);

    if depth == max_depth {
        return Ok(());
    }

    let read_dir = match std::fs::read_dir(path) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            warn!("Could not list {:?}: {}", path, e);
            return Ok(());
        }
    };
    for entry in read_dir.flatten() {
        if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            if let Err(e) = watch_locked(state, &entry.path(), depth + 1, max_depth) {
                warn!("Could not watch {:?}: {}", entry.path(), e);
            }
        }
    }
    Ok(())
}

/// Internal `DIRECTORY` handler keeping the tree in step with the filesystem.
pub(crate) fn track_directories(event: &WatchEvent, tree: &WatchTree) {
    if event.kind.contains(FileEvent::ADDED) {
        let Some(depth) = event.path.parent().and_then(|parent| tree.depth_of(parent)) else {
            return;
        };
        if depth < tree.max_depth() {
            if let Err(e) = tree.watch(&event.path, depth + 1) {
                warn!("Could not watch new directory {:?}: {}", event.path, e);
            }
        }
    } else if event.kind.contains(FileEvent::REMOVED) {
        tree.forget(&event.path);
    }
}
