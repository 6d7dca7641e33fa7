//! Callback registry shared between a watcher and its polling thread

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::event::{FileEvent, WatchEvent};

/// Signature of a file event callback.
///
/// Callbacks are identified by function address, so registering the same
/// function twice is a no-op.
pub type FileCallback<C> = fn(&WatchEvent, &C);

struct Registration {
    id: usize,
    mask: FileEvent,
    invoke: Box<dyn Fn(&WatchEvent) + Send + Sync>,
}

#[derive(Default)]
pub(crate) struct CallbackList {
    entries: Mutex<Vec<Arc<Registration>>>,
}

fn callback_id<C>(callback: FileCallback<C>) -> usize {
    callback as usize
}

impl CallbackList {
    /// Returns false if `callback` was already registered.
    pub(crate) fn add<C>(&self, callback: FileCallback<C>, mask: FileEvent, context: Arc<C>) -> bool
    where
        C: Send + Sync + 'static,
    {
        let id = callback_id(callback);
        let mut entries = self.entries.lock();

        if entries.iter().any(|entry| entry.id == id) {
            warn!("Callback {:#x} already exists within file watcher", id);
            return false;
        }

        entries.push(Arc::new(Registration {
            id,
            mask,
            invoke: Box::new(move |event: &WatchEvent| callback(event, &context)),
        }));
        debug!("Registered file callback {:#x} for {:?}", id, mask);
        true
    }

    /// Returns false if `callback` was never registered.
    pub(crate) fn remove<C>(&self, callback: FileCallback<C>) -> bool {
        let id = callback_id(callback);
        let mut entries = self.entries.lock();

        match entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Invoke every callback whose mask intersects the event.
    ///
    /// Runs on a snapshot, so callbacks may add or remove callbacks.
    pub(crate) fn dispatch(&self, event: &WatchEvent) -> usize {
        let targets: Vec<Arc<Registration>> = self
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.mask.intersects(event.kind))
            .cloned()
            .collect();

        for target in &targets {
            (target.invoke)(event);
        }
        targets.len()
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
