//! Last-event-wins debouncing with a single armed timer.
//!
//! Bursts of raw events (editor saves, `git checkout`, a session file being
//! rewritten) collapse into one downstream signal per quiet period. Only the
//! most recent event of a window is kept.
//!
//! All mutable state sits behind one lock:
//!
//! ```text
//! PendingState { latest, timer, generation, closed }
//!        ^                 ^
//!   worker: accept()   timer task: fire()      caller: close()
//! ```
//!
//! The timer task checks `closed` inside the same critical section as its
//! `try_send`, so nothing reaches the outbound queue once `close()` returned.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

use super::event::RawEvent;
use super::handler::WatchHandler;

#[derive(Debug, Default)]
struct PendingState {
    /// Latest accepted event of the open window.
    latest: Option<RawEvent>,
    /// The armed delay timer, if any.
    timer: Option<JoinHandle<()>>,
    /// Bumped on every re-arm; a timer only fires for its own generation.
    generation: u64,
    closed: bool,
}

struct Shared<H: WatchHandler> {
    handler: Arc<H>,
    state: Mutex<PendingState>,
    delay: Duration,
    tx: mpsc::Sender<H::Signal>,
}

/// Debounces raw events for one handler and delivers signals best-effort.
pub struct Debouncer<H: WatchHandler> {
    shared: Arc<Shared<H>>,
    runtime: Handle,
}

impl<H: WatchHandler> Debouncer<H> {
    /// Create a debouncer delivering into `tx`.
    ///
    /// Must be called from within a tokio runtime; timers are spawned on it.
    pub fn new(handler: Arc<H>, delay: Duration, tx: mpsc::Sender<H::Signal>) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                state: Mutex::new(PendingState::default()),
                delay,
                tx,
            }),
            runtime: Handle::current(),
        }
    }

    /// Create a debouncer together with its bounded outbound queue.
    pub fn with_capacity(
        handler: Arc<H>,
        delay: Duration,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<H::Signal>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(handler, delay, tx), rx)
    }

    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    pub fn delay(&self) -> Duration {
        self.shared.delay
    }

    /// Record an event and restart the delay timer.
    ///
    /// The event replaces any earlier event of the current window. Returns
    /// `false` once the debouncer is closed.
    pub fn accept(&self, event: RawEvent) -> bool {
        let mut state = self.shared.state.lock();
        if state.closed {
            return false;
        }

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation = state.generation.wrapping_add(1);
        state.latest = Some(event);

        let shared = Arc::clone(&self.shared);
        let generation = state.generation;
        state.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(shared.delay).await;
            fire(shared, generation).await;
        }));
        true
    }

    /// Stop accepting events and cancel the armed timer.
    ///
    /// Irreversible. Does not wait for a timer that is already running; such
    /// a timer observes `closed` before it may enqueue.
    pub fn close(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.latest = None;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        crate::debug_event!(self.shared.handler.name(), "debouncer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Check if a window is open (an event waits for its timer).
    pub fn has_pending(&self) -> bool {
        self.shared.state.lock().latest.is_some()
    }
}

impl<H: WatchHandler> Drop for Debouncer<H> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Timer callback: derive a signal from the window's latest event and try to
/// enqueue it.
async fn fire<H: WatchHandler>(shared: Arc<Shared<H>>, generation: u64) {
    let event = {
        let mut state = shared.state.lock();
        if state.closed || state.generation != generation {
            return;
        }
        state.timer = None;
        state.latest.take()
    };
    let Some(event) = event else {
        return;
    };

    let name = shared.handler.name();
    let Some(signal) = shared.handler.derive(&event).await else {
        crate::debug_event!(name, "discarded", "{} {}", event.op, event.path.display());
        return;
    };

    let state = shared.state.lock();
    if state.closed {
        crate::debug_event!(name, "closed, dropping", "{}", event.path.display());
        return;
    }
    match shared.tx.try_send(signal) {
        Ok(()) => {
            crate::debug_event!(name, "notified", "{} {}", event.op, event.path.display());
        }
        Err(TrySendError::Full(_)) => {
            crate::debug_event!(name, "queue full, dropped", "{}", event.path.display());
        }
        Err(TrySendError::Closed(_)) => {
            crate::debug_event!(name, "no receiver", "{}", event.path.display());
        }
    }
    drop(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::event::FsOp;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use tokio::time::Instant;

    /// Emits the path of the event that closed the window.
    struct PathEcho;

    #[async_trait]
    impl WatchHandler for PathEcho {
        type Signal = PathBuf;

        fn name(&self) -> &str {
            "echo"
        }

        fn matches(&self, _path: &Path) -> bool {
            true
        }

        async fn derive(&self, event: &RawEvent) -> Option<PathBuf> {
            Some(event.path.clone())
        }
    }

    fn echo(delay_ms: u64, capacity: usize) -> (Debouncer<PathEcho>, mpsc::Receiver<PathBuf>) {
        Debouncer::with_capacity(
            Arc::new(PathEcho),
            Duration::from_millis(delay_ms),
            capacity,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_last_event() {
        let (debouncer, mut rx) = echo(100, 4);
        let start = Instant::now();

        debouncer.accept(RawEvent::new("/w/first", FsOp::Create));
        tokio::time::advance(Duration::from_millis(20)).await;
        debouncer.accept(RawEvent::new("/w/second", FsOp::Write));
        tokio::time::advance(Duration::from_millis(20)).await;
        debouncer.accept(RawEvent::new("/w/third", FsOp::Write));

        let path = rx.recv().await.unwrap();
        assert_eq!(path, PathBuf::from("/w/third"));
        assert_eq!(start.elapsed(), Duration::from_millis(140));

        // Nothing else was queued for the superseded events
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_windows_deliver_in_order() {
        let (debouncer, mut rx) = echo(50, 4);

        debouncer.accept(RawEvent::new("/w/a", FsOp::Write));
        tokio::time::sleep(Duration::from_millis(80)).await;
        debouncer.accept(RawEvent::new("/w/b", FsOp::Write));

        assert_eq!(rx.recv().await.unwrap(), PathBuf::from("/w/a"));
        assert_eq!(rx.recv().await.unwrap(), PathBuf::from("/w/b"));
        assert!(!debouncer.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_instead_of_blocking() {
        let (debouncer, mut rx) = echo(10, 1);

        debouncer.accept(RawEvent::new("/w/a", FsOp::Write));
        tokio::time::sleep(Duration::from_millis(20)).await;
        debouncer.accept(RawEvent::new("/w/b", FsOp::Write));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(rx.try_recv().unwrap(), PathBuf::from("/w/a"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_armed_timer() {
        let (debouncer, mut rx) = echo(100, 4);

        debouncer.accept(RawEvent::new("/w/a", FsOp::Write));
        tokio::time::advance(Duration::from_millis(50)).await;
        debouncer.close();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
        assert!(debouncer.is_closed());
        assert!(!debouncer.accept(RawEvent::new("/w/b", FsOp::Write)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_disconnects_after_drop() {
        let (debouncer, mut rx) = echo(10, 4);
        debouncer.accept(RawEvent::new("/w/a", FsOp::Write));
        drop(debouncer);

        // Aborted timer releases its sender; the receiver sees the end
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_send_after_close_under_races() {
        for round in 0..200u64 {
            let (debouncer, mut rx) = echo(1, 8);
            debouncer.accept(RawEvent::new(format!("/w/{round}"), FsOp::Write));

            // Vary where close lands relative to the 1ms timer
            match round % 4 {
                0 => {}
                1 => tokio::task::yield_now().await,
                2 => std::thread::sleep(Duration::from_micros(900)),
                _ => std::thread::sleep(Duration::from_micros(1100)),
            }

            debouncer.close();
            // Whatever was enqueued before close may still be read
            while rx.try_recv().is_ok() {}

            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(
                rx.try_recv().is_err(),
                "signal enqueued after close in round {round}"
            );
        }
    }
}
