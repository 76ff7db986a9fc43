//! Reconcile a [`FileTree`] with the filesystem after bus notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::tree::{FileTree, RefreshStats, TreeResult};
use crate::watcher::handlers::FsChange;

/// Tree shared between the synchronizer (writer) and the display (readers).
pub type SharedTree = Arc<RwLock<FileTree>>;

/// What a resync did to the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Directories were rescanned; the flat list may have changed.
    ///
    /// The hinted directory comes first when it was expanded. `stats` sums
    /// every rescan.
    Refreshed { dirs: Vec<PathBuf>, stats: RefreshStats },
    /// A collapsed directory dropped its retained children.
    Invalidated { dir: PathBuf },
    /// Nothing materialized was affected.
    Unaffected,
}

/// Resync the tree for one changed path.
///
/// The hinted directory is the path's parent, walking up to the nearest
/// directory the tree knows. Expanded directories (and the root) are
/// rescanned, collapsed ones with retained children are invalidated, and
/// anything else is left alone.
///
/// A signal only carries the last event of its window, so every other
/// scanned directory whose mtime moved is reconciled as well. A failed
/// rescan of the hinted directory returns the error before that sweep.
pub fn resync(tree: &mut FileTree, changed: &Path) -> TreeResult<SyncOutcome> {
    let Some(root) = tree.root() else {
        return Ok(SyncOutcome::Unaffected);
    };
    let root_dir = tree.root_dir().to_path_buf();

    let start = if changed == root_dir || !changed.starts_with(&root_dir) {
        root_dir.as_path()
    } else {
        changed.parent().unwrap_or(root_dir.as_path())
    };

    let id = start
        .ancestors()
        .take_while(|dir| dir.starts_with(&root_dir))
        .find_map(|dir| tree.find(dir).filter(|&id| tree.node(id).is_some_and(|n| n.is_dir)))
        .unwrap_or(root);

    let Some(node) = tree.node(id) else {
        return Ok(SyncOutcome::Unaffected);
    };
    let dir = node.path.clone();

    let mut dirs = Vec::new();
    let mut stats = RefreshStats::default();
    let mut hinted = SyncOutcome::Unaffected;
    if node.is_expanded {
        stats = tree.refresh_dir(id)?;
        dirs.push(dir);
    } else if tree.invalidate(id) {
        hinted = SyncOutcome::Invalidated { dir };
    }

    for (dir, swept) in tree.reconcile(&[id]) {
        stats.added += swept.added;
        stats.removed += swept.removed;
        dirs.push(dir);
    }

    if dirs.is_empty() {
        Ok(hinted)
    } else {
        Ok(SyncOutcome::Refreshed { dirs, stats })
    }
}

/// Drives [`FileTree`] updates from tree bus notifications.
///
/// Issues no watches of its own; the bus decides what is observed.
#[derive(Clone)]
pub struct TreeSynchronizer {
    tree: SharedTree,
}

impl TreeSynchronizer {
    pub fn new(tree: SharedTree) -> Self {
        Self { tree }
    }

    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// Apply one notification under the tree's write lock.
    ///
    /// Scan errors are returned to the caller only; the tree keeps its
    /// previous state for that directory.
    pub fn apply(&self, change: &FsChange) -> TreeResult<SyncOutcome> {
        let mut tree = self.tree.write();
        resync(&mut tree, &change.path)
    }

    /// Consume notifications until the bus closes its queue.
    ///
    /// Outcomes that changed the tree are forwarded to `updates` with
    /// drop-when-full delivery.
    pub async fn run(
        self,
        mut changes: mpsc::Receiver<FsChange>,
        updates: mpsc::Sender<SyncOutcome>,
    ) {
        while let Some(change) = changes.recv().await {
            let sync = self.clone();
            let path = change.path.clone();
            let result = tokio::task::spawn_blocking(move || sync.apply(&change)).await;

            match result {
                Ok(Ok(SyncOutcome::Unaffected)) => {
                    crate::debug_event!("sync", "unaffected", "{}", path.display());
                }
                Ok(Ok(outcome)) => {
                    crate::debug_event!("sync", "applied", "{outcome:?}");
                    if let Err(TrySendError::Full(_)) = updates.try_send(outcome) {
                        crate::debug_event!("sync", "update dropped", "{}", path.display());
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("[sync] resync failed: {e}");
                }
                Err(e) => {
                    tracing::error!("[sync] resync task failed: {e}");
                }
            }
        }
        crate::debug_event!("sync", "stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::FsOp;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SharedTree) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/nested")).unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("src/lib.rs"), "").unwrap();
        fs::write(root.join("docs/guide.md"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();

        let mut tree = FileTree::without_ignores(root);
        tree.build().unwrap();
        (temp_dir, Arc::new(RwLock::new(tree)))
    }

    fn change(path: PathBuf, op: FsOp) -> FsChange {
        FsChange { path, op }
    }

    fn names(tree: &SharedTree) -> Vec<String> {
        tree.read().visible().map(|n| n.name.clone()).collect()
    }

    #[test]
    fn test_change_in_root_refreshes_root() {
        let (dir, tree) = fixture();
        let sync = TreeSynchronizer::new(tree.clone());

        let added = dir.path().join("CHANGELOG.md");
        fs::write(&added, "").unwrap();
        let outcome = sync.apply(&change(added, FsOp::Create)).unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Refreshed {
                dirs: vec![dir.path().to_path_buf()],
                stats: RefreshStats { added: 1, removed: 0 },
            }
        );
        assert_eq!(names(&tree), ["docs", "src", "CHANGELOG.md", "README.md"]);
    }

    #[test]
    fn test_change_in_expanded_dir_refreshes_only_it() {
        let (dir, tree) = fixture();
        {
            let mut t = tree.write();
            let docs = t.find(&dir.path().join("docs")).unwrap();
            let src = t.find(&dir.path().join("src")).unwrap();
            t.expand(docs).unwrap();
            t.expand(src).unwrap();
        }
        let sync = TreeSynchronizer::new(tree.clone());

        let added = dir.path().join("src/main.rs");
        fs::write(&added, "").unwrap();
        let outcome = sync.apply(&change(added, FsOp::Write)).unwrap();

        assert!(matches!(
            outcome,
            SyncOutcome::Refreshed { ref dirs, .. } if dirs.len() == 1 && dirs[0].ends_with("src")
        ));
        assert_eq!(
            names(&tree),
            ["docs", "guide.md", "src", "nested", "lib.rs", "main.rs", "README.md"]
        );
    }

    #[test]
    fn test_burst_across_expanded_dirs_refreshes_both() {
        let (dir, tree) = fixture();
        {
            let mut t = tree.write();
            let docs = t.find(&dir.path().join("docs")).unwrap();
            let src = t.find(&dir.path().join("src")).unwrap();
            t.expand(docs).unwrap();
            t.expand(src).unwrap();
        }
        let sync = TreeSynchronizer::new(tree.clone());

        // One window, two directories; the signal names only the last write
        fs::write(dir.path().join("docs/intro.md"), "").unwrap();
        let last = dir.path().join("src/main.rs");
        fs::write(&last, "").unwrap();
        let outcome = sync.apply(&change(last, FsOp::Write)).unwrap();

        let SyncOutcome::Refreshed { dirs, stats } = outcome else {
            panic!("expected a refresh, got {outcome:?}");
        };
        assert_eq!(dirs[0], dir.path().join("src"));
        assert!(dirs.contains(&dir.path().join("docs")));
        assert_eq!(stats, RefreshStats { added: 2, removed: 0 });
        assert_eq!(
            names(&tree),
            ["docs", "guide.md", "intro.md", "src", "nested", "lib.rs", "main.rs", "README.md"]
        );
    }

    #[test]
    fn test_change_in_collapsed_dir_does_not_rebuild() {
        let (dir, tree) = fixture();
        let sync = TreeSynchronizer::new(tree.clone());

        // Never expanded: nothing materialized below the root
        let outcome = sync
            .apply(&change(dir.path().join("src/new.rs"), FsOp::Create))
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Unaffected);

        // Expanded once, then collapsed: retained children are dropped
        {
            let mut t = tree.write();
            let src = t.find(&dir.path().join("src")).unwrap();
            t.expand(src).unwrap();
            t.collapse(src).unwrap();
        }
        let before = names(&tree);
        let outcome = sync
            .apply(&change(dir.path().join("src/new.rs"), FsOp::Create))
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Invalidated { .. }));
        assert_eq!(names(&tree), before);
    }

    #[test]
    fn test_deep_unknown_path_walks_up_to_expanded_ancestor() {
        let (dir, tree) = fixture();
        let sync = TreeSynchronizer::new(tree.clone());

        // New directory and a file inside it in one window; only the file
        // survives coalescing
        fs::create_dir(dir.path().join("assets")).unwrap();
        let file = dir.path().join("assets/logo.svg");
        fs::write(&file, "").unwrap();

        let outcome = sync.apply(&change(file, FsOp::Write)).unwrap();
        assert!(matches!(outcome, SyncOutcome::Refreshed { .. }));
        assert_eq!(names(&tree), ["assets", "docs", "src", "README.md"]);
    }

    #[test]
    fn test_removed_subtree_keeps_sibling_expansion() {
        let (dir, tree) = fixture();
        {
            let mut t = tree.write();
            let docs = t.find(&dir.path().join("docs")).unwrap();
            let src = t.find(&dir.path().join("src")).unwrap();
            t.expand(docs).unwrap();
            t.expand(src).unwrap();
        }
        let sync = TreeSynchronizer::new(tree.clone());

        fs::remove_dir_all(dir.path().join("docs")).unwrap();
        sync.apply(&change(dir.path().join("docs"), FsOp::Remove))
            .unwrap();

        assert_eq!(names(&tree), ["src", "nested", "lib.rs", "README.md"]);
        let t = tree.read();
        assert!(t.find(&dir.path().join("docs/guide.md")).is_none());
        let src = t.find(&dir.path().join("src")).unwrap();
        assert!(t.node(src).unwrap().is_expanded);
    }

    #[test]
    fn test_unreadable_dir_surfaces_scan_error() {
        let (dir, tree) = fixture();
        {
            let mut t = tree.write();
            let src = t.find(&dir.path().join("src")).unwrap();
            t.expand(src).unwrap();
        }
        let sync = TreeSynchronizer::new(tree.clone());
        let before = names(&tree);

        fs::remove_dir_all(dir.path().join("src")).unwrap();
        // The event names a child; its parent is gone, so the rescan fails
        let result = sync.apply(&change(dir.path().join("src/lib.rs"), FsOp::Remove));

        assert!(result.is_err());
        assert_eq!(names(&tree), before);
    }

    #[test]
    fn test_unbuilt_tree_is_unaffected() {
        let temp_dir = TempDir::new().unwrap();
        let mut tree = FileTree::without_ignores(temp_dir.path());
        let outcome = resync(&mut tree, &temp_dir.path().join("x")).unwrap();
        assert_eq!(outcome, SyncOutcome::Unaffected);
    }

    #[tokio::test]
    async fn test_run_forwards_outcomes_until_closed() {
        let (dir, tree) = fixture();
        let sync = TreeSynchronizer::new(tree.clone());
        let (tx, rx) = mpsc::channel(4);
        let (updates_tx, mut updates) = mpsc::channel(4);
        let task = tokio::spawn(sync.run(rx, updates_tx));

        let added = dir.path().join("new.txt");
        fs::write(&added, "").unwrap();
        tx.send(change(added, FsOp::Create)).await.unwrap();
        tx.send(change(dir.path().join("src/x.rs"), FsOp::Create))
            .await
            .unwrap();
        drop(tx);

        let first = updates.recv().await.unwrap();
        assert!(matches!(first, SyncOutcome::Refreshed { .. }));
        // Unaffected outcomes are not forwarded; the queue ends with the task
        assert_eq!(updates.recv().await, None);
        task.await.unwrap();
        assert!(names(&tree).contains(&"new.txt".to_string()));
    }
}
