//! A file tree kept current by a tree bus and a synchronizer task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::synchronizer::{SharedTree, SyncOutcome, TreeSynchronizer};
use crate::config::Settings;
use crate::tree::{FileTree, IgnoreMatcher, TreeError};
use crate::watcher::handlers::TreeChangeHandler;
use crate::watcher::{DebouncedEventBus, WatchError};

#[derive(Error, Debug)]
pub enum LiveTreeError {
    #[error("Failed to build tree: {0}")]
    Tree(#[from] TreeError),

    #[error("Failed to watch tree: {0}")]
    Watch(#[from] WatchError),
}

/// Owns the shared tree, its bus and the synchronizer task.
///
/// The root is always watched. Directories below it are watched when they
/// appear, and with `watch.watch_subdirs` also those present at startup.
pub struct LiveTree {
    root: PathBuf,
    tree: SharedTree,
    bus: DebouncedEventBus<TreeChangeHandler>,
    sync_task: JoinHandle<()>,
}

impl LiveTree {
    /// Build the tree one level deep and start keeping it in sync.
    ///
    /// Returns the live tree and a receiver of outcomes that changed the
    /// tree, meant as a redraw signal. Must be called inside a tokio runtime.
    pub fn start(
        root: impl Into<PathBuf>,
        settings: &Settings,
    ) -> Result<(Self, mpsc::Receiver<SyncOutcome>), LiveTreeError> {
        let root = root.into();
        let ignore = IgnoreMatcher::new(
            root.clone(),
            &settings.tree.ignore_patterns,
            settings.tree.respect_gitignore,
        )?;

        let mut tree = FileTree::new(root.clone(), ignore.clone());
        tree.build()?;
        let tree: SharedTree = Arc::new(RwLock::new(tree));

        let (bus, changes) = DebouncedEventBus::<TreeChangeHandler>::builder(root.clone())
            .debounce_ms(settings.watch.debounce_ms)
            .capacity(settings.watch.capacity)
            .watch_subdirs(settings.watch.watch_subdirs)
            .ignore(ignore)
            .start(TreeChangeHandler::new())?;

        let (updates_tx, updates_rx) = mpsc::channel(settings.watch.capacity.max(1));
        let synchronizer = TreeSynchronizer::new(Arc::clone(&tree));
        let sync_task = tokio::spawn(synchronizer.run(changes, updates_tx));

        crate::log_event!("tree", "live", "{}", root.display());
        Ok((
            Self {
                root,
                tree,
                bus,
                sync_task,
            },
            updates_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared tree. Hold the read lock only while drawing.
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// Stop watching and wait for the synchronizer to drain.
    pub async fn shutdown(self) {
        self.bus.shutdown().await;
        if let Err(e) = self.sync_task.await {
            tracing::warn!("[sync] synchronizer ended abnormally: {e}");
        }
    }
}
