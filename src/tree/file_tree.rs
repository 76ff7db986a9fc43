//! Lazily materialized directory tree with a flat list of visible rows.
//!
//! Nodes live in an arena addressed by [`NodeId`]. The flat list stores ids
//! in pre-order for every visible node, so expand/collapse are slice splices
//! around one node instead of full walks.
//!
//! ```text
//! root (not a row)
//! ├── alpha/        flat[0]   expanded
//! │   ├── inner/    flat[1]
//! │   └── a.txt     flat[2]
//! ├── delta/        flat[3]   collapsed, children retained
//! └── beta.txt      flat[4]
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{TreeError, TreeResult};
use super::ignore_rules::IgnoreMatcher;
use super::node::{FileNode, NodeId, ScanStamp, ScannedEntry, sort_entries};

/// Counts from one directory rescan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    pub added: usize,
    pub removed: usize,
}

/// Partially expanded mirror of a directory subtree.
///
/// Not synchronized; share it behind a lock when a synchronizer writes while
/// the display reads.
#[derive(Debug)]
pub struct FileTree {
    root_dir: PathBuf,
    ignore: IgnoreMatcher,
    slots: Vec<Option<FileNode>>,
    free: Vec<usize>,
    by_path: HashMap<PathBuf, NodeId>,
    root: Option<NodeId>,
    flat: Vec<NodeId>,
}

impl FileTree {
    /// Create an empty tree. Call [`build`](Self::build) to scan the root.
    pub fn new(root_dir: impl Into<PathBuf>, ignore: IgnoreMatcher) -> Self {
        Self {
            root_dir: root_dir.into(),
            ignore,
            slots: Vec::new(),
            free: Vec::new(),
            by_path: HashMap::new(),
            root: None,
            flat: Vec::new(),
        }
    }

    /// Create a tree that flags nothing as ignored.
    pub fn without_ignores(root_dir: impl Into<PathBuf>) -> Self {
        let root_dir = root_dir.into();
        let ignore = IgnoreMatcher::empty(&root_dir);
        Self::new(root_dir, ignore)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Rescan the root one level deep, discarding all previous state.
    ///
    /// On failure the previous tree is left untouched.
    pub fn build(&mut self) -> TreeResult<()> {
        let stamp = ScanStamp::take(&self.root_dir);
        let entries = self.scan_dir(&self.root_dir)?;

        self.slots.clear();
        self.free.clear();
        self.by_path.clear();
        self.flat.clear();

        let name = self
            .root_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root_dir.display().to_string());
        let mut root = FileNode::new(
            ScannedEntry {
                name,
                path: self.root_dir.clone(),
                is_dir: true,
                is_ignored: false,
            },
            0,
            None,
        );
        root.is_expanded = true;
        root.stamp = stamp;

        let root_id = self.alloc(root);
        self.root = Some(root_id);
        let children = self.attach_children(root_id, entries);
        self.flat = children;

        crate::debug_event!(
            "tree",
            "built",
            "{} ({} entries)",
            self.root_dir.display(),
            self.flat.len()
        );
        Ok(())
    }

    /// Expand a directory, scanning it on first use.
    ///
    /// If the directory is visible its children are spliced into the flat
    /// list right after it. On scan failure the node stays collapsed.
    pub fn expand(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.require_dir(id)?;
        if node.is_expanded {
            return Ok(());
        }

        let mut stamp = None;
        if !node.is_materialized() {
            let path = node.path.clone();
            stamp = ScanStamp::take(&path);
            let entries = self.scan_dir(&path)?;
            self.attach_children(id, entries);
        }

        if let Some(node) = self.node_mut(id) {
            node.is_expanded = true;
            if stamp.is_some() {
                node.stamp = stamp;
            }
        }

        if self.is_visible(id) {
            if let Some(pos) = self.position(id) {
                let mut rows = Vec::new();
                self.collect_visible(id, &mut rows);
                self.flat.splice(pos + 1..pos + 1, rows);
            }
        }
        Ok(())
    }

    /// Collapse a directory and every expanded directory below it.
    ///
    /// Children stay materialized for a fast re-expand.
    pub fn collapse(&mut self, id: NodeId) -> TreeResult<()> {
        let node = self.require_dir(id)?;
        if !node.is_expanded || Some(id) == self.root {
            return Ok(());
        }

        if self.is_visible(id) {
            if let Some(pos) = self.position(id) {
                let count = self.region_len(pos);
                self.flat.drain(pos + 1..pos + 1 + count);
            }
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node_mut(current) {
                node.is_expanded = false;
                if let Some(children) = &node.children {
                    stack.extend(children.iter().copied());
                }
            }
        }
        Ok(())
    }

    /// Expand a collapsed directory or collapse an expanded one.
    pub fn toggle(&mut self, id: NodeId) -> TreeResult<()> {
        if self.require_dir(id)?.is_expanded {
            self.collapse(id)
        } else {
            self.expand(id)
        }
    }

    /// Expand every non-ignored directory up to `max_depth`.
    ///
    /// Directories that cannot be read are skipped.
    pub fn expand_to_depth(&mut self, max_depth: usize) {
        let mut i = 0;
        while let Some(id) = self.flat.get(i).copied() {
            let wanted = self
                .node(id)
                .is_some_and(|n| n.is_dir && !n.is_expanded && !n.is_ignored && n.depth < max_depth);
            if wanted {
                if let Err(e) = self.expand(id) {
                    crate::debug_event!("tree", "skipped", "{e}");
                }
            }
            i += 1;
        }
    }

    /// Rescan one materialized directory and merge the result.
    ///
    /// Entries that still exist keep their node, expansion state and
    /// retained children. Vanished entries are freed with their subtrees.
    /// Only this directory's region of the flat list is rewritten.
    pub fn refresh_dir(&mut self, id: NodeId) -> TreeResult<RefreshStats> {
        let node = self.require_dir(id)?;
        let Some(old_children) = node.children.clone() else {
            return Ok(RefreshStats::default());
        };
        let path = node.path.clone();
        let stamp = ScanStamp::take(&path);
        let entries = self.scan_dir(&path)?;

        // Locate the visible region before the child list changes
        let region = if Some(id) == self.root {
            Some((0, self.flat.len()))
        } else if node.is_expanded && self.is_visible(id) {
            self.position(id)
                .map(|pos| (pos + 1, self.region_len(pos)))
        } else {
            None
        };

        let mut old_by_name: HashMap<String, NodeId> = old_children
            .iter()
            .filter_map(|&child| self.node(child).map(|n| (n.name.clone(), child)))
            .collect();

        let mut plan: Vec<Result<NodeId, ScannedEntry>> = Vec::with_capacity(entries.len());
        let mut stale = Vec::new();
        for entry in entries {
            match old_by_name.remove(&entry.name) {
                Some(existing) if self.node(existing).is_some_and(|n| n.is_dir == entry.is_dir) => {
                    if let Some(node) = self.node_mut(existing) {
                        node.is_ignored = entry.is_ignored;
                    }
                    plan.push(Ok(existing));
                }
                Some(existing) => {
                    stale.push(existing);
                    plan.push(Err(entry));
                }
                None => plan.push(Err(entry)),
            }
        }
        stale.extend(old_by_name.into_values());

        let removed = stale.len();
        for gone in stale {
            self.free_subtree(gone);
        }

        let depth = self.node(id).map(|n| n.depth + 1).unwrap_or(1);
        let mut added = 0;
        let children: Vec<NodeId> = plan
            .into_iter()
            .map(|slot| match slot {
                Ok(existing) => existing,
                Err(entry) => {
                    added += 1;
                    self.alloc(FileNode::new(entry, depth, Some(id)))
                }
            })
            .collect();

        if let Some(node) = self.node_mut(id) {
            node.children = Some(children);
            node.stamp = stamp;
        }

        if let Some((start, len)) = region {
            let mut rows = Vec::new();
            self.collect_visible(id, &mut rows);
            self.flat.splice(start..start + len, rows);
        }

        Ok(RefreshStats { added, removed })
    }

    /// Drop the retained children of a collapsed directory.
    ///
    /// The next expand rescans it. Returns `false` when there was nothing to
    /// drop or the directory is expanded (refresh it instead).
    pub fn invalidate(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if !node.is_dir || node.is_expanded || Some(id) == self.root {
            return false;
        }
        let Some(children) = node.children.clone() else {
            return false;
        };

        for child in children {
            self.free_subtree(child);
        }
        if let Some(node) = self.node_mut(id) {
            node.children = None;
            node.stamp = None;
        }
        true
    }

    /// Whether a scanned directory's listing may be out of date.
    ///
    /// Compares the directory's current mtime with the one recorded before
    /// its last scan. Unscanned directories are never stale; a directory
    /// whose mtime cannot be read is.
    pub fn is_stale(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        if !node.is_dir || !node.is_materialized() {
            return false;
        }
        let Some(stamp) = node.stamp else {
            return true;
        };
        match fs::metadata(&node.path).and_then(|m| m.modified()) {
            Ok(current) => stamp.is_stale(current),
            Err(_) => true,
        }
    }

    /// Bring every scanned directory back in line with the disk.
    ///
    /// Walks scanned directories parents first, skipping `skip`, and
    /// rescans the stale ones whether expanded or not. Returns the
    /// directories whose listing changed. Scan failures are logged and
    /// skipped; the parent's rescan drops a directory that vanished.
    pub fn reconcile(&mut self, skip: &[NodeId]) -> Vec<(PathBuf, RefreshStats)> {
        let Some(root) = self.root else {
            return Vec::new();
        };

        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(children) = self.node(id).and_then(|n| n.children.as_ref()) else {
                continue;
            };
            order.push(id);
            stack.extend(
                children
                    .iter()
                    .rev()
                    .copied()
                    .filter(|&c| self.node(c).is_some_and(|n| n.is_dir)),
            );
        }

        let mut changed = Vec::new();
        for id in order {
            // Freed (or reused for an unscanned node) by an earlier rescan
            if skip.contains(&id) || !self.is_stale(id) {
                continue;
            }
            let Some(path) = self.node(id).map(|n| n.path.clone()) else {
                continue;
            };
            match self.refresh_dir(id) {
                Ok(stats) if stats.added + stats.removed > 0 => changed.push((path, stats)),
                Ok(_) => {}
                Err(e) => crate::debug_event!("tree", "reconcile skipped", "{e}"),
            }
        }
        changed
    }

    /// Node at a flat-list row, or `None` outside `[0, len())`.
    pub fn get_node(&self, index: usize) -> Option<&FileNode> {
        self.id_at(index).and_then(|id| self.node(id))
    }

    /// Node id at a flat-list row.
    pub fn id_at(&self, index: usize) -> Option<NodeId> {
        self.flat.get(index).copied()
    }

    /// Number of visible rows.
    pub fn len(&self) -> usize {
        self.flat.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&FileNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Look up a materialized node by path.
    pub fn find(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).copied()
    }

    /// Row of the node with this path, if it is visible.
    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.find(path).and_then(|id| self.position(id))
    }

    /// Visible rows in display order.
    pub fn visible(&self) -> impl Iterator<Item = &FileNode> {
        self.flat.iter().filter_map(|&id| self.node(id))
    }

    /// Whether a node is a row of the flat list (all ancestors expanded).
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let mut parent = node.parent;
        while let Some(p) = parent {
            if Some(p) == self.root {
                return true;
            }
            match self.node(p) {
                Some(pn) if pn.is_expanded => parent = pn.parent,
                _ => return false,
            }
        }
        false
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        self.flat.iter().position(|&row| row == id)
    }

    /// Number of rows after `pos` that belong to its subtree.
    fn region_len(&self, pos: usize) -> usize {
        let Some(depth) = self.id_at(pos).and_then(|id| self.node(id)).map(|n| n.depth) else {
            return 0;
        };
        self.flat[pos + 1..]
            .iter()
            .take_while(|&&row| self.node(row).is_some_and(|n| n.depth > depth))
            .count()
    }

    /// Pre-order visible descendants of `id` (not including `id`).
    fn collect_visible(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let Some(children) = self.node(id).and_then(|n| n.children.as_ref()) else {
            return;
        };
        for &child in children {
            out.push(child);
            if self.node(child).is_some_and(|n| n.is_expanded) {
                self.collect_visible(child, out);
            }
        }
    }

    fn require_dir(&self, id: NodeId) -> TreeResult<&FileNode> {
        let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
        if !node.is_dir {
            return Err(TreeError::NotADirectory {
                path: node.path.clone(),
            });
        }
        Ok(node)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut FileNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Read one directory level, sorted and flagged.
    fn scan_dir(&self, dir: &Path) -> TreeResult<Vec<ScannedEntry>> {
        let read = fs::read_dir(dir).map_err(|source| TreeError::Scan {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut entries = Vec::new();
        for entry in read {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    crate::debug_event!("tree", "unreadable entry", "{}: {e}", dir.display());
                    continue;
                }
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let mut scanned =
                ScannedEntry::new(dir, entry.file_name().to_string_lossy().into_owned(), is_dir);
            scanned.is_ignored = self.ignore.is_ignored(&scanned.path, is_dir);
            entries.push(scanned);
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Allocate nodes for scanned entries under `parent`.
    fn attach_children(&mut self, parent: NodeId, entries: Vec<ScannedEntry>) -> Vec<NodeId> {
        let depth = self.node(parent).map(|n| n.depth + 1).unwrap_or(1);
        let children: Vec<NodeId> = entries
            .into_iter()
            .map(|entry| self.alloc(FileNode::new(entry, depth, Some(parent))))
            .collect();
        if let Some(node) = self.node_mut(parent) {
            node.children = Some(children.clone());
        }
        children
    }

    fn alloc(&mut self, node: FileNode) -> NodeId {
        let path = node.path.clone();
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        self.by_path.insert(path, id);
        id
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.slots.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            if self.by_path.get(&node.path) == Some(&current) {
                self.by_path.remove(&node.path);
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
            self.free.push(current.0);
        }
    }
}
