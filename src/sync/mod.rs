//! Keeping a [`FileTree`](crate::tree::FileTree) in step with the disk.
//!
//! ```text
//! DebouncedEventBus<TreeChangeHandler> --FsChange--> TreeSynchronizer
//!                                                      | write lock
//!                                                   SharedTree <-- display (read lock)
//! ```

mod cursor;
mod live;
mod synchronizer;

pub use cursor::{CursorAnchor, TreeCursor};
pub use live::{LiveTree, LiveTreeError};
pub use synchronizer::{SharedTree, SyncOutcome, TreeSynchronizer, resync};
