//! Handler trait for the debounced event bus.

use std::path::Path;

use async_trait::async_trait;

use super::event::RawEvent;

/// Trait for consumers that turn debounced filesystem events into signals.
///
/// A handler declares which paths it cares about and derives at most one
/// downstream signal from the last event of each debounce window.
#[async_trait]
pub trait WatchHandler: Send + Sync + 'static {
    /// Signal delivered on the bus' outbound queue.
    type Signal: Send + 'static;

    /// Handler name for logging.
    fn name(&self) -> &str;

    /// Check if this handler should see events for the given path.
    fn matches(&self, path: &Path) -> bool;

    /// Whether directories created under a watched tree join the watch set.
    fn watch_new_dirs(&self) -> bool {
        false
    }

    /// Derive a signal from the latest event of a closed debounce window.
    ///
    /// Called outside the bus lock, so it may read the file. Returning
    /// `None` discards the window.
    async fn derive(&self, event: &RawEvent) -> Option<Self::Signal>;
}
