//! Typed errors for the dynamic loader.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or releasing a native library image.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoaderError {
    /// Nothing exists at the requested path.
    #[error("Library not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The OS loader rejected the image.
    #[error("Failed to load library {}: {reason}", .path.display())]
    Load {
        /// Path that was being loaded.
        path: PathBuf,
        /// Loader-provided reason.
        reason: String,
    },

    /// The OS refused to release the image.
    #[error("Failed to unload library {}: {reason}", .path.display())]
    Unload {
        /// Path of the library that is still referenced.
        path: PathBuf,
        /// Loader-provided reason.
        reason: String,
    },
}
