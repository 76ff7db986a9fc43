//! Handler implementations for the debounced event bus.

pub mod session;
pub mod tree;

pub use session::{SessionEvent, SessionEventClassifier, SessionEventKind, watch_sessions};
pub use tree::{FsChange, TreeChangeHandler};
