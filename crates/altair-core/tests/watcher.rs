//! File watcher behaviour on a real directory tree

mod common;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use altair_core::watcher::{FileEvent, FileWatcher, WatchEvent, WatcherConfig, WatcherError};
use common::wait_until;
use parking_lot::Mutex;

const POLL: Duration = Duration::from_millis(20);
const PATIENCE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<WatchEvent>>,
}

impl Recorder {
    fn paths(&self) -> Vec<PathBuf> {
        self.events.lock().iter().map(|e| e.path.clone()).collect()
    }

    fn count(&self) -> usize {
        self.events.lock().len()
    }
}

fn record(event: &WatchEvent, recorder: &Recorder) {
    recorder.events.lock().push(event.clone());
}

fn record_again(event: &WatchEvent, recorder: &Recorder) {
    recorder.events.lock().insert(0, event.clone());
}

// ============================================================================
// Event delivery
// ============================================================================

#[test]
fn test_filtered_file_creation_fires_added_once() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::create(dir.path(), 1, "*.mod", POLL).unwrap();
    let recorder = Arc::new(Recorder::default());
    watcher
        .add_callback(record, FileEvent::ADDED, recorder.clone())
        .unwrap();

    fs::File::create(dir.path().join("x.mod")).unwrap();
    fs::File::create(dir.path().join("y.txt")).unwrap();

    assert!(wait_until(PATIENCE, || recorder.count() >= 1));
    std::thread::sleep(Duration::from_millis(200));

    let events = recorder.events.lock().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, FileEvent::ADDED);
    assert_eq!(events[0].file_name(), "x.mod");
}

#[test]
fn test_write_and_remove_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::create(dir.path(), 1, "*", POLL).unwrap();
    let recorder = Arc::new(Recorder::default());
    watcher
        .add_callback(record, FileEvent::MODIFIED | FileEvent::REMOVED, recorder.clone())
        .unwrap();

    let file = dir.path().join("plugin.so");
    fs::write(&file, b"v1").unwrap();
    assert!(wait_until(PATIENCE, || {
        recorder.events.lock().iter().any(|e| e.kind == FileEvent::MODIFIED)
    }));

    fs::remove_file(&file).unwrap();
    assert!(wait_until(PATIENCE, || {
        recorder.events.lock().iter().any(|e| e.kind == FileEvent::REMOVED)
    }));
    assert!(recorder.paths().iter().all(|p| p == &file));
}

#[test]
fn test_existing_files_settle_as_modified() {
    let dir = tempfile::tempdir().unwrap();
    let existing = dir.path().join("early.so");
    fs::write(&existing, b"already here").unwrap();

    let watcher = FileWatcher::create_suspended(
        WatcherConfig::new(dir.path()).with_poll_interval(POLL),
    )
    .unwrap();
    let recorder = Arc::new(Recorder::default());
    watcher
        .add_callback(record, FileEvent::MODIFIED, recorder.clone())
        .unwrap();
    watcher.start();

    assert!(wait_until(PATIENCE, || recorder.paths().contains(&existing)));
    assert_eq!(fs::read(&existing).unwrap(), b"already here");
}

// ============================================================================
// Directory tracking
// ============================================================================

#[test]
fn test_new_subdirectories_are_watched_within_depth() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::create(dir.path(), 2, "*.so", POLL).unwrap();
    let recorder = Arc::new(Recorder::default());
    watcher
        .add_callback(record, FileEvent::ADDED, recorder.clone())
        .unwrap();

    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    assert!(wait_until(PATIENCE, || watcher.watched_directories().contains(&sub)));

    // The directory event bypasses the filter and carries the directory bit.
    assert!(recorder
        .events
        .lock()
        .iter()
        .any(|e| e.path == sub && e.kind == FileEvent::ADDED | FileEvent::DIRECTORY));

    let nested_file = sub.join("nested.so");
    fs::File::create(&nested_file).unwrap();
    assert!(wait_until(PATIENCE, || recorder.paths().contains(&nested_file)));

    let deeper = sub.join("deeper");
    fs::create_dir(&deeper).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(!watcher.watched_directories().contains(&deeper));
}

#[test]
fn test_existing_subdirectories_are_watched_on_create() {
    let dir = tempfile::tempdir().unwrap();
    let level2 = dir.path().join("a");
    let level3 = level2.join("b");
    let level4 = level3.join("c");
    fs::create_dir_all(&level4).unwrap();

    let watcher = FileWatcher::create(dir.path(), 3, "*", POLL).unwrap();
    let watched = watcher.watched_directories();

    assert_eq!(watched[0], dir.path());
    assert!(watched.contains(&level2));
    assert!(watched.contains(&level3));
    assert!(!watched.contains(&level4));
}

#[test]
fn test_removed_subdirectory_is_forgotten() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("gone");
    fs::create_dir(&sub).unwrap();

    let watcher = FileWatcher::create(dir.path(), 2, "*", POLL).unwrap();
    assert!(watcher.watched_directories().contains(&sub));

    fs::remove_dir(&sub).unwrap();
    assert!(wait_until(PATIENCE, || !watcher.watched_directories().contains(&sub)));
    assert_eq!(watcher.watched_directories(), vec![dir.path().to_path_buf()]);
}

// ============================================================================
// Callbacks and lifecycle
// ============================================================================

#[test]
fn test_callbacks_are_idempotent_and_removable() {
    let dir = tempfile::tempdir().unwrap();
    let watcher = FileWatcher::create(dir.path(), 1, "*", POLL).unwrap();
    let recorder = Arc::new(Recorder::default());

    watcher.add_callback(record, FileEvent::ADDED, recorder.clone()).unwrap();
    watcher.add_callback(record, FileEvent::ADDED, recorder.clone()).unwrap();

    fs::File::create(dir.path().join("once")).unwrap();
    assert!(wait_until(PATIENCE, || recorder.count() >= 1));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(recorder.count(), 1);

    assert!(matches!(
        watcher.remove_callback(record_again),
        Err(WatcherError::CallbackNotFound)
    ));
    watcher.remove_callback(record).unwrap();
    assert!(matches!(
        watcher.remove_callback(record),
        Err(WatcherError::CallbackNotFound)
    ));
}

#[test]
fn test_invalid_configurations_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let missing = FileWatcher::create(dir.path().join("missing"), 1, "*", POLL);
    assert!(matches!(missing, Err(WatcherError::InvalidRoot(_))));

    let bad_filter = FileWatcher::create(dir.path(), 1, "[", POLL);
    assert!(matches!(bad_filter, Err(WatcherError::Filter { .. })));

    let zero_depth = FileWatcher::create(dir.path(), 0, "*", POLL);
    assert!(matches!(zero_depth, Err(WatcherError::InvalidConfig(_))));
}

#[test]
fn test_destroy_stops_thread_and_releases_watches() {
    let dir = tempfile::tempdir().unwrap();
    let mut watcher = FileWatcher::create(dir.path(), 1, "*", Duration::from_secs(10)).unwrap();
    assert!(watcher.is_running());

    // Exit wakes the polling thread out of its sleep.
    watcher.destroy(Duration::from_secs(2)).unwrap();
    assert!(!watcher.is_running());
    assert!(watcher.watched_directories().is_empty());

    watcher.destroy(Duration::from_secs(2)).unwrap();
}
