//! Dynamic library loader
//!
//! Loads native library images and resolves exported symbols by name. Each
//! [`DynamicLibrary`] keeps a cache of resolved symbols so that repeated
//! lookups never go back to the OS loader.

mod error;
mod native;

pub use error::LoaderError;
pub use native::NativeLoader;

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, error, info};

use crate::hash::fnv1a64_str;

/// Address of a resolved export.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress(NonNull<c_void>);

// SAFETY: an address is an inert value. Whether the pointee may be used from
// another thread is a property of the plugin contract, not of the address.
unsafe impl Send for SymbolAddress {}
unsafe impl Sync for SymbolAddress {}

impl SymbolAddress {
    /// Wrap a raw address, rejecting null.
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    /// Wrap the address of a function or static.
    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::new(ptr as *mut c_void)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for SymbolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({:p})", self.0)
    }
}

/// An opened library image, as seen by the OS loader.
pub trait ModuleImage: Send + Sync {
    /// Ask the OS loader for an export. Never cached at this level.
    fn lookup(&self, name: &str) -> Option<SymbolAddress>;

    /// Release the image.
    fn close(self: Box<Self>) -> Result<(), LoaderError>;
}

/// Opens library images.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleImage>, LoaderError>;
}

/// One symbol cache entry.
#[derive(Debug, Clone)]
struct CachedSymbol {
    hash: u64,
    name: String,
    address: SymbolAddress,
}

/// A loaded library with its lazily populated symbol cache.
pub struct DynamicLibrary {
    /// Path the library was loaded from
    path: PathBuf,
    /// OS module handle
    image: Box<dyn ModuleImage>,
    /// Resolved symbols, never evicted
    symbols: Vec<CachedSymbol>,
}

impl fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .field("cached_symbols", &self.symbols.len())
            .finish()
    }
}

impl DynamicLibrary {
    /// Load a library through the platform loader.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        Self::load_with(&NativeLoader, path)
    }

    /// Load a library through an arbitrary [`ModuleLoader`].
    pub fn load_with<P: AsRef<Path>>(
        loader: &dyn ModuleLoader,
        path: P,
    ) -> Result<Self, LoaderError> {
        let path = path.as_ref().to_path_buf();

        let image = loader.open(&path).inspect_err(|e| {
            error!("Cannot load library {:?}: {}", path, e);
        })?;

        info!("Loaded library {:?}", path);
        Ok(Self {
            path,
            image,
            symbols: Vec::with_capacity(4),
        })
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of cached symbols
    pub fn cached_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// Resolve an export, consulting the cache first.
    ///
    /// A miss on a `required` symbol is logged as an error; optional misses
    /// are only traced.
    pub fn resolve_symbol(&mut self, name: &str, required: bool) -> Option<SymbolAddress> {
        if let Some(address) = self.find_symbol(name) {
            return Some(address);
        }

        match self.image.lookup(name) {
            Some(address) => {
                debug!("Resolved symbol '{}' from {:?}", name, self.path);
                self.symbols.push(CachedSymbol {
                    hash: fnv1a64_str(name),
                    name: name.to_string(),
                    address,
                });
                Some(address)
            }
            None if required => {
                error!("Symbol '{}' not found within library {:?}", name, self.path);
                None
            }
            None => {
                debug!("Symbol '{}' not found within library {:?}", name, self.path);
                None
            }
        }
    }

    /// Look a symbol up in the cache only.
    pub fn find_symbol(&self, name: &str) -> Option<SymbolAddress> {
        let hash = fnv1a64_str(name);
        self.symbols
            .iter()
            .find(|symbol| symbol.hash == hash && symbol.name == name)
            .map(|symbol| symbol.address)
    }

    /// Release the library and its cache.
    pub fn unload(self) -> Result<(), LoaderError> {
        let DynamicLibrary {
            path,
            image,
            symbols,
        } = self;
        drop(symbols);

        match image.close() {
            Ok(()) => {
                info!("Unloaded library {:?}", path);
                Ok(())
            }
            Err(e) => {
                error!("Cannot free library {:?}: {}", path, e);
                Err(e)
            }
        }
    }
}
