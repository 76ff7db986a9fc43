//! Lazily materialized file tree for list-style display.
//!
//! Directories are scanned one level at a time as they are expanded.
//! Rows are addressed by their index in a flat list of visible nodes.

mod error;
mod file_tree;
mod ignore_rules;
mod node;

pub use error::{TreeError, TreeResult};
pub use file_tree::{FileTree, RefreshStats};
pub use ignore_rules::IgnoreMatcher;
pub use node::{FileNode, NodeId, ScannedEntry, compare_entries, sort_entries};
