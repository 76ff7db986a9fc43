//! Keep the display cursor on the same entry across tree mutations.

use std::path::PathBuf;

use crate::tree::FileTree;

/// Display position over the flat list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeCursor {
    /// Selected row.
    pub index: usize,
    /// First row shown in the viewport.
    pub scroll_offset: usize,
}

impl TreeCursor {
    pub fn new(index: usize, scroll_offset: usize) -> Self {
        Self {
            index,
            scroll_offset,
        }
    }
}

/// Cursor state captured before a resync.
///
/// Holds the selected entry's path so the cursor can follow it when rows
/// above it are inserted or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorAnchor {
    path: Option<PathBuf>,
    cursor: TreeCursor,
}

impl CursorAnchor {
    pub fn capture(tree: &FileTree, cursor: TreeCursor) -> Self {
        let path = tree.get_node(cursor.index).map(|n| n.path.clone());
        Self { path, cursor }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Cursor for the mutated tree.
    ///
    /// The anchored entry keeps the selection if it is still visible.
    /// Otherwise the old index is clamped into range, or 0 for an empty
    /// tree. The scroll offset then moves just enough to keep the selection
    /// inside a viewport of `viewport_height` rows.
    pub fn restore(&self, tree: &FileTree, viewport_height: usize) -> TreeCursor {
        if tree.is_empty() {
            return TreeCursor::default();
        }
        let last = tree.len() - 1;

        let index = self
            .path
            .as_deref()
            .and_then(|path| tree.index_of(path))
            .unwrap_or_else(|| self.cursor.index.min(last));

        // Follow the entry: keep its distance from the top of the viewport
        let shift = index as isize - self.cursor.index as isize;
        let mut offset = (self.cursor.scroll_offset as isize + shift).max(0) as usize;

        let height = viewport_height.max(1);
        if index < offset {
            offset = index;
        } else if index >= offset + height {
            offset = index + 1 - height;
        }
        let max_offset = tree.len().saturating_sub(height);
        TreeCursor::new(index, offset.min(max_offset))
    }
}
