//! `libloading`-backed module loader

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use tracing::debug;

use super::{LoaderError, ModuleImage, ModuleLoader, SymbolAddress};

/// Loads images through the platform loader (`dlopen`/`LoadLibrary`).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl NativeLoader {
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLoader for NativeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn ModuleImage>, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }

        // SAFETY: loading a library runs its initialisers. Plugins placed in
        // the watched directory are trusted to follow the plugin contract.
        let library = unsafe { Library::new(path) }.map_err(|e| LoaderError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!("Opened native image {:?}", path);
        Ok(Box::new(NativeModule {
            path: path.to_path_buf(),
            library,
        }))
    }
}

/// A library opened by [`NativeLoader`].
struct NativeModule {
    path: PathBuf,
    library: Library,
}

impl ModuleImage for NativeModule {
    fn lookup(&self, name: &str) -> Option<SymbolAddress> {
        // SAFETY: the symbol is only read as an untyped address here; callers
        // reinterpret it according to the plugin contract.
        let symbol: Symbol<'_, *mut c_void> = unsafe { self.library.get(name.as_bytes()) }.ok()?;
        SymbolAddress::new(*symbol)
    }

    fn close(self: Box<Self>) -> Result<(), LoaderError> {
        let NativeModule { path, library } = *self;
        library.close().map_err(|e| LoaderError::Unload {
            path,
            reason: e.to_string(),
        })
    }
}
