//! Error types for the debounced watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to start watching {path}: {reason}")]
    SetupFailed { path: PathBuf, reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },
}

impl WatchError {
    pub(crate) fn path_watch(path: &std::path::Path, e: notify::Error) -> Self {
        WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        let path = e.paths.first().cloned().unwrap_or_default();
        WatchError::SetupFailed {
            path,
            reason: e.to_string(),
        }
    }
}
