//! Handler for file tree watching.
//!
//! Accepts every change under the tree and hands the synchronizer the path
//! of the last event in each window.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::watcher::{FsOp, RawEvent, WatchHandler};

/// Signal that something changed under a watched tree.
///
/// Carries the last raw event of the window only. Treat it as a hint about
/// where to look, not as an event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    pub path: PathBuf,
    pub op: FsOp,
}

/// Handler feeding the tree synchronizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeChangeHandler;

impl TreeChangeHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WatchHandler for TreeChangeHandler {
    type Signal = FsChange;

    fn name(&self) -> &str {
        "tree"
    }

    fn matches(&self, _path: &Path) -> bool {
        true
    }

    fn watch_new_dirs(&self) -> bool {
        true
    }

    async fn derive(&self, event: &RawEvent) -> Option<FsChange> {
        Some(FsChange {
            path: event.path.clone(),
            op: event.op,
        })
    }
}
