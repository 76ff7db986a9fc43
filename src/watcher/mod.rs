//! Debounced file watching.
//!
//! A single `notify` watcher per bus feeds a last-event-wins debouncer that
//! delivers signals from a pluggable handler.
//!
//! # Architecture
//!
//! ```text
//! DebouncedEventBus
//!   - notify::RecommendedWatcher (owned by a blocking watch-adder task)
//!   - worker task draining raw events, never waiting on notify
//!   - Debouncer { latest, timer, closed } behind one lock
//!   - bounded outbound queue, drop when full
//!         |
//!    +----------+------------+
//!    |                       |
//! TreeChangeHandler   SessionEventClassifier
//! ```

mod bus;
mod debouncer;
mod error;
mod event;
mod handler;
pub mod handlers;

pub use bus::{DebouncedEventBus, EventBusBuilder};
pub use debouncer::Debouncer;
pub use error::WatchError;
pub use event::{FsOp, RawEvent};
pub use handler::WatchHandler;
