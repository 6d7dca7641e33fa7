//! Errors raised by the file watcher.

use std::path::PathBuf;

use thiserror::Error;

use crate::sync::ThreadError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WatcherError {
    /// The watch root is missing or not a directory.
    #[error("Cannot watch {}: not a directory", .0.display())]
    InvalidRoot(PathBuf),

    /// The filename filter is not a valid glob.
    #[error("Invalid filter pattern '{pattern}': {source}")]
    Filter {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Invalid watcher configuration: {0}")]
    InvalidConfig(String),

    /// The OS change-notification backend failed.
    #[error("Change notification backend error: {0}")]
    Backend(#[from] notify::Error),

    /// The callback was never registered with this watcher.
    #[error("Callback is not registered with this watcher")]
    CallbackNotFound,

    /// Starting or stopping the polling thread failed.
    #[error(transparent)]
    Thread(#[from] ThreadError),
}

pub type WatcherResult<T> = Result<T, WatcherError>;
