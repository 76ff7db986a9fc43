//! Ignore matching for tree entries.
//!
//! Patterns use gitignore syntax. Matching entries stay in the tree and are
//! only flagged, so the display layer can dim them.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use super::error::{TreeError, TreeResult};

/// Compiled ignore rules anchored at a tree root.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    root: PathBuf,
    rules: Gitignore,
}

impl IgnoreMatcher {
    /// A matcher that ignores nothing.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            rules: Gitignore::empty(),
            root,
        }
    }

    /// Compile `patterns`, optionally adding the root's `.gitignore`.
    ///
    /// A missing `.gitignore` is not an error; a bad pattern is.
    pub fn new(
        root: impl Into<PathBuf>,
        patterns: &[String],
        respect_gitignore: bool,
    ) -> TreeResult<Self> {
        let root = root.into();
        let mut builder = GitignoreBuilder::new(&root);

        if respect_gitignore {
            let gitignore = root.join(".gitignore");
            if gitignore.is_file() {
                if let Some(e) = builder.add(&gitignore) {
                    tracing::warn!("[tree] partial .gitignore at {}: {e}", gitignore.display());
                }
            }
        }

        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| TreeError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
        }

        let rules = builder.build().map_err(|e| TreeError::InvalidPattern {
            pattern: patterns.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self { root, rules })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check whether an entry (or one of its parents) matches an ignore rule.
    ///
    /// Paths outside the root never match.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if !path.starts_with(&self.root) || path == self.root {
            return false;
        }
        self.rules
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}
