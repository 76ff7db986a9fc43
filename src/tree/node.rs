//! File tree nodes and the directories-first ordering.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Directory mtimes this close to the scan may hide a later change made in
/// the same timestamp tick.
const RACY_WINDOW: Duration = Duration::from_secs(2);

/// Stable handle to a node in a [`FileTree`](super::FileTree) arena.
///
/// Valid until the node is removed by a rebuild or a resync; slots are
/// recycled afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One filesystem entry.
#[derive(Debug, Clone)]
pub struct FileNode {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    /// Only meaningful for directories.
    pub is_expanded: bool,
    pub is_ignored: bool,
    /// Distance from the tree root (root = 0).
    pub depth: usize,
    pub(crate) parent: Option<NodeId>,
    /// `None` until the directory has been scanned.
    pub(crate) children: Option<Vec<NodeId>>,
    /// Directory mtime as of the last scan.
    pub(crate) stamp: Option<ScanStamp>,
}

impl FileNode {
    pub(crate) fn new(entry: ScannedEntry, depth: usize, parent: Option<NodeId>) -> Self {
        Self {
            name: entry.name,
            path: entry.path,
            is_dir: entry.is_dir,
            is_expanded: false,
            is_ignored: entry.is_ignored,
            depth,
            parent,
            children: None,
            stamp: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in display order, if scanned.
    pub fn children(&self) -> Option<&[NodeId]> {
        self.children.as_deref()
    }

    pub fn is_materialized(&self) -> bool {
        self.children.is_some()
    }
}

/// When a directory listing was read, and the directory's mtime just before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScanStamp {
    mtime: SystemTime,
    scanned_at: SystemTime,
}

impl ScanStamp {
    /// Stamp taken before reading `dir`. `None` if the mtime is unavailable.
    pub(crate) fn take(dir: &Path) -> Option<Self> {
        let mtime = std::fs::metadata(dir).and_then(|m| m.modified()).ok()?;
        Some(Self {
            mtime,
            scanned_at: SystemTime::now(),
        })
    }

    /// Whether a listing taken with this stamp may no longer match `current`.
    pub(crate) fn is_stale(&self, current: SystemTime) -> bool {
        if current != self.mtime {
            return true;
        }
        !self
            .scanned_at
            .duration_since(self.mtime)
            .is_ok_and(|age| age >= RACY_WINDOW)
    }
}

/// A directory entry read from disk, before it joins the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_ignored: bool,
}

impl ScannedEntry {
    pub fn new(parent: &Path, name: impl Into<String>, is_dir: bool) -> Self {
        let name = name.into();
        Self {
            path: parent.join(&name),
            name,
            is_dir,
            is_ignored: false,
        }
    }
}

/// Directories first, then case-sensitive name order within each group.
pub fn compare_entries(a_is_dir: bool, a_name: &str, b_is_dir: bool, b_name: &str) -> Ordering {
    b_is_dir.cmp(&a_is_dir).then_with(|| a_name.cmp(b_name))
}

/// Sort sibling entries: all directories (alphabetical) before all files
/// (alphabetical).
pub fn sort_entries(entries: &mut [ScannedEntry]) {
    entries.sort_by(|a, b| compare_entries(a.is_dir, &a.name, b.is_dir, &b.name));
}
