//! Shared fixtures for the integration suites.
//!
//! [`FakeLoader`] stands in for the OS loader: "libraries" are tables of
//! exports pointing at functions and statics inside the test binary, keyed by
//! file name.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use altair_core::loader::{LoaderError, ModuleImage, ModuleLoader, SymbolAddress};
use parking_lot::Mutex;

pub static TYPE_OTHER: u32 = 0x0001;
pub static TYPE_ASYNC: u32 = 0x0100;

/// Export table of one fake library.
#[derive(Debug, Clone, Default)]
pub struct FakeModule {
    exports: HashMap<String, SymbolAddress>,
}

impl FakeModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export<T>(mut self, name: &str, ptr: *const T) -> Self {
        let address = SymbolAddress::from_ptr(ptr).expect("export address must not be null");
        self.exports.insert(name.to_string(), address);
        self
    }

    pub fn with_type(self, bits: &'static u32) -> Self {
        self.export("type", bits as *const u32)
    }
}

#[derive(Debug, Default)]
pub struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub lookups: AtomicUsize,
}

struct FakeImage {
    exports: HashMap<String, SymbolAddress>,
    counters: Arc<Counters>,
}

impl ModuleImage for FakeImage {
    fn lookup(&self, name: &str) -> Option<SymbolAddress> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        self.exports.get(name).copied()
    }

    fn close(self: Box<Self>) -> Result<(), LoaderError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLoader {
    modules: Mutex<HashMap<String, FakeModule>>,
    counters: Arc<Counters>,
}

impl FakeLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `module` for any path whose file name is `file_name`.
    pub fn install(&self, file_name: &str, module: FakeModule) {
        self.modules.lock().insert(file_name.to_string(), module);
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.counters.lookups.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleImage>, LoaderError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let module = self
            .modules
            .lock()
            .get(&name)
            .cloned()
            .ok_or_else(|| LoaderError::NotFound(path.to_path_buf()))?;

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeImage {
            exports: module.exports,
            counters: self.counters.clone(),
        }))
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
