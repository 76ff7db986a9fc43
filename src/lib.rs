pub mod cli;
pub mod config;
pub mod logging;
pub mod sync;
pub mod tree;
pub mod watcher;

pub use config::Settings;
pub use sync::{CursorAnchor, LiveTree, SharedTree, SyncOutcome, TreeCursor, TreeSynchronizer};
pub use tree::{FileNode, FileTree, IgnoreMatcher, NodeId, TreeError};
pub use watcher::handlers::{
    FsChange, SessionEvent, SessionEventClassifier, SessionEventKind, TreeChangeHandler,
    watch_sessions,
};
pub use watcher::{DebouncedEventBus, FsOp, RawEvent, WatchError, WatchHandler};
