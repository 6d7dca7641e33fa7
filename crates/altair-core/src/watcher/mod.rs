//! Recursive file watcher
//!
//! Watches a directory tree up to a maximum depth and dispatches translated
//! change events to registered callbacks from a dedicated polling thread.

mod callback;
mod error;
mod event;
mod tree;

pub use callback::FileCallback;
pub use error::{WatcherError, WatcherResult};
pub use event::{FileEvent, WatchEvent};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

use glob::Pattern;
use notify::{Event, RecommendedWatcher, Watcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::sync::{Launch, WorkerContext, WorkerThread};

use callback::CallbackList;
use tree::{WatchTree, track_directories};

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Directory to watch (depth 1)
    pub root: PathBuf,
    /// Deepest directory level watched
    pub max_depth: u32,
    /// Shell glob matched against file names
    pub filter: String,
    /// Sleep between polls when no events are queued
    pub poll_interval: Duration,
    /// Wait bound for the polling thread to exit
    pub teardown_timeout: Duration,
}

impl WatcherConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            max_depth: 1,
            filter: "*".to_string(),
            poll_interval: Duration::from_millis(1000),
            teardown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = filter.to_string();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }
}

/// State moved onto the polling thread.
struct Poller {
    events: Receiver<notify::Result<Event>>,
    tree: Arc<WatchTree>,
    callbacks: Arc<CallbackList>,
    filter: Pattern,
    poll_interval: Duration,
}

impl Poller {
    fn run(self, worker: &WorkerContext) {
        info!("File watcher '{}' polling", worker.name());

        loop {
            if worker.should_exit() {
                break;
            }
            self.tree.settle_pending();

            let mut drained = 0;
            loop {
                match self.events.try_recv() {
                    Ok(Ok(event)) => {
                        self.dispatch(event);
                        drained += 1;
                    }
                    Ok(Err(e)) => warn!("File watcher backend error: {}", e),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        debug!("File watcher backend disconnected");
                        break;
                    }
                }
            }

            if drained == 0 && worker.wait_for_exit(self.poll_interval) {
                break;
            }
        }

        info!("File watcher '{}' exiting", worker.name());
        worker.acknowledge_exit();
    }

    fn dispatch(&self, event: Event) {
        for path in event.paths {
            let is_directory = path.is_dir() || self.tree.is_watched(&path);
            let kind = FileEvent::translate(&event.kind, is_directory);
            if kind.is_empty() {
                continue;
            }

            let event = WatchEvent::new(kind, path);
            if !kind.is_directory() && !self.filter.matches(&event.file_name()) {
                continue;
            }

            debug!("{:?} {:?}", event.kind, event.path);
            self.callbacks.dispatch(&event);
        }
    }
}

/// A recursive file watcher with its own polling thread.
pub struct FileWatcher {
    config: WatcherConfig,
    tree: Arc<WatchTree>,
    callbacks: Arc<CallbackList>,
    thread: WorkerThread,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("config", &self.config)
            .field("running", &self.thread.is_alive())
            .finish()
    }
}

impl FileWatcher {
    /// Watch `path` down to `max_depth` and start polling immediately.
    pub fn create<P: Into<PathBuf>>(
        path: P,
        max_depth: u32,
        filter: &str,
        poll_interval: Duration,
    ) -> WatcherResult<Self> {
        Self::with_config(
            WatcherConfig::new(path)
                .with_max_depth(max_depth)
                .with_filter(filter)
                .with_poll_interval(poll_interval),
        )
    }

    /// Create and start a watcher.
    pub fn with_config(config: WatcherConfig) -> WatcherResult<Self> {
        Self::build(config, Launch::Immediately)
    }

    /// Create a watcher whose polling thread waits for [`FileWatcher::start`],
    /// so callbacks can be registered before any event is dispatched.
    pub fn create_suspended(config: WatcherConfig) -> WatcherResult<Self> {
        Self::build(config, Launch::Suspended)
    }

    fn build(config: WatcherConfig, launch: Launch) -> WatcherResult<Self> {
        if config.max_depth == 0 {
            return Err(WatcherError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if !config.root.is_dir() {
            error!("Cannot watch {:?}: not a directory", config.root);
            return Err(WatcherError::InvalidRoot(config.root.clone()));
        }
        let filter = Pattern::new(&config.filter).map_err(|source| WatcherError::Filter {
            pattern: config.filter.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel();
        let backend = RecommendedWatcher::new(tx, notify::Config::default())?;
        let tree = Arc::new(WatchTree::new(backend, config.max_depth));
        tree.watch(&config.root, 1)?;

        let callbacks = Arc::new(CallbackList::default());
        callbacks.add(track_directories, FileEvent::DIRECTORY, tree.clone());

        let poller = Poller {
            events: rx,
            tree: tree.clone(),
            callbacks: callbacks.clone(),
            filter,
            poll_interval: config.poll_interval,
        };
        let thread = WorkerThread::spawn(
            format!("filewatcher-{}", config.root.display()),
            launch,
            move |worker| poller.run(worker),
        )?;

        info!("File watcher created for {:?}", config.root);
        Ok(Self {
            config,
            tree,
            callbacks,
            thread,
        })
    }

    /// Release a watcher created with [`FileWatcher::create_suspended`].
    pub fn start(&self) {
        self.thread.start();
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_alive()
    }

    /// Subscribe `callback` to events intersecting `mask`.
    ///
    /// Registering an already registered callback is a no-op.
    pub fn add_callback<C>(&self, callback: FileCallback<C>, mask: FileEvent, context: Arc<C>) -> WatcherResult<()>
    where
        C: Send + Sync + 'static,
    {
        self.callbacks.add(callback, mask, context);
        Ok(())
    }

    pub fn remove_callback<C>(&self, callback: FileCallback<C>) -> WatcherResult<()> {
        if self.callbacks.remove(callback) {
            Ok(())
        } else {
            error!("Callback is not within the file watcher; cannot remove");
            Err(WatcherError::CallbackNotFound)
        }
    }

    /// Currently watched directories, root first.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.tree.directories()
    }

    /// Stop the polling thread, then drop every watch and callback.
    ///
    /// If the thread does not exit within `timeout` nothing is released.
    pub fn destroy(&mut self, timeout: Duration) -> WatcherResult<()> {
        self.thread.destroy(timeout).inspect_err(|e| {
            error!("Could not destroy file watcher thread: {}", e);
        })?;
        self.tree.unwatch_all();
        self.callbacks.clear();
        Ok(())
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.destroy(self.config.teardown_timeout) {
            error!("File watcher for {:?} leaked on drop: {}", self.config.root, e);
        }
    }
}
