//! Debounced event bus over a `notify` watcher.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::tree::IgnoreMatcher;

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::event::{FsOp, RawEvent};
use super::handler::WatchHandler;

/// Capacity of the channel between notify's thread and the worker.
///
/// notify's callback never waits on it: events that do not fit are counted
/// and dropped.
const RAW_CHANNEL_CAPACITY: usize = 256;

/// Watches a directory and delivers coalesced signals from one handler.
///
/// One worker task drains the OS watch source; delay timers run as separate
/// tasks. New directories are watched from a blocking task that owns the
/// watcher, so the worker keeps draining while a watch is added. Signals go
/// to a bounded queue with drop-when-full delivery, so consumers must
/// re-derive truth from the filesystem.
pub struct DebouncedEventBus<H: WatchHandler> {
    root: PathBuf,
    debouncer: Arc<Debouncer<H>>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
    adder: Option<JoinHandle<()>>,
}

impl<H: WatchHandler> DebouncedEventBus<H> {
    /// Create a builder for a bus rooted at `root`.
    pub fn builder(root: impl Into<PathBuf>) -> EventBusBuilder {
        EventBusBuilder::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.debouncer.is_closed()
    }

    /// Stop the bus without waiting for the worker.
    ///
    /// After this returns no further signal is enqueued.
    pub fn close(&self) {
        self.debouncer.close();
        self.cancel.cancel();
    }

    /// Stop the bus and wait for the worker and the watcher to go away.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                tracing::warn!("[watcher] worker ended abnormally: {e}");
            }
        }
        if let Some(adder) = self.adder.take() {
            if let Err(e) = adder.await {
                tracing::warn!("[watcher] watch task ended abnormally: {e}");
            }
        }
        crate::debug_event!("watcher", "stopped", "{}", self.root.display());
    }
}

impl<H: WatchHandler> Drop for DebouncedEventBus<H> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builder for a [`DebouncedEventBus`].
pub struct EventBusBuilder {
    root: PathBuf,
    debounce_ms: u64,
    capacity: usize,
    watch_subdirs: bool,
    ignore: Option<IgnoreMatcher>,
}

impl EventBusBuilder {
    /// Create a new builder with defaults.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            debounce_ms: 100,
            capacity: 1,
            watch_subdirs: false,
            ignore: None,
        }
    }

    /// Set the debounce duration in milliseconds.
    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set the outbound queue capacity (at least 1).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Also watch the subdirectories that exist at start.
    pub fn watch_subdirs(mut self, enabled: bool) -> Self {
        self.watch_subdirs = enabled;
        self
    }

    /// Skip ignored directories when walking subdirectories at start.
    pub fn ignore(mut self, matcher: IgnoreMatcher) -> Self {
        self.ignore = Some(matcher);
        self
    }

    /// Start watching and spawn the worker.
    ///
    /// Fails if the root cannot be watched. Must be called inside a tokio
    /// runtime.
    pub fn start<H: WatchHandler>(
        self,
        handler: H,
    ) -> Result<(DebouncedEventBus<H>, mpsc::Receiver<H::Signal>), WatchError> {
        if !self.root.is_dir() {
            return Err(WatchError::SetupFailed {
                path: self.root.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let (raw_tx, raw_rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));
        let overflow = Arc::clone(&dropped);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // Never block notify's thread: `watch()` calls wait on it
            if raw_tx.try_send(res).is_err() {
                overflow.fetch_add(1, Ordering::Relaxed);
            }
        })?;

        watcher
            .watch(&self.root, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::SetupFailed {
                path: self.root.clone(),
                reason: e.to_string(),
            })?;

        if self.watch_subdirs {
            let added = watch_existing_subdirs(&mut watcher, &self.root, self.ignore.as_ref());
            crate::debug_event!(handler.name(), "watching subdirectories", "{added}");
        }

        let handler = Arc::new(handler);
        let (debouncer, rx) = Debouncer::with_capacity(
            Arc::clone(&handler),
            Duration::from_millis(self.debounce_ms),
            self.capacity,
        );
        let debouncer = Arc::new(debouncer);
        let cancel = CancellationToken::new();

        let (dirs_tx, dirs_rx) = mpsc::unbounded_channel();
        let adder = {
            let name = handler.name().to_string();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || add_watches(watcher, dirs_rx, &name, &cancel))
        };

        let worker = tokio::spawn(run_worker(
            raw_rx,
            dirs_tx,
            dropped,
            Arc::clone(&debouncer),
            cancel.clone(),
        ));

        crate::log_event!(handler.name(), "watching", "{}", self.root.display());

        Ok((
            DebouncedEventBus {
                root: self.root,
                debouncer,
                cancel,
                worker: Some(worker),
                adder: Some(adder),
            },
            rx,
        ))
    }
}

/// Watch every existing subdirectory below `root` non-recursively.
///
/// Failures are ignored; those subtrees are simply not live-watched.
fn watch_existing_subdirs(
    watcher: &mut RecommendedWatcher,
    root: &Path,
    ignore: Option<&IgnoreMatcher>,
) -> usize {
    let mut added = 0;
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.file_type().is_dir()
                && !ignore.is_some_and(|m| m.is_ignored(entry.path(), true))
        });

    for entry in walker.filter_map(Result::ok) {
        match watcher.watch(entry.path(), RecursiveMode::NonRecursive) {
            Ok(()) => added += 1,
            Err(e) => {
                let err = WatchError::path_watch(entry.path(), e);
                crate::debug_event!("watcher", "skipped", "{err}");
            }
        }
    }
    added
}

/// Own the watcher and add a non-recursive watch for each new directory.
///
/// Runs on a blocking thread until the worker drops its sender or the bus
/// is cancelled. The watcher is dropped on return, ending notify's thread.
fn add_watches(
    mut watcher: RecommendedWatcher,
    mut dirs: mpsc::UnboundedReceiver<PathBuf>,
    name: &str,
    cancel: &CancellationToken,
) {
    while let Some(dir) = dirs.blocking_recv() {
        if cancel.is_cancelled() {
            break;
        }
        match watcher.watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => crate::debug_event!(name, "watching new dir", "{}", dir.display()),
            Err(e) => {
                let err = WatchError::path_watch(&dir, e);
                crate::debug_event!(name, "skipped", "{err}");
            }
        }
    }
}

/// Drain the OS watch source until cancelled.
async fn run_worker<H: WatchHandler>(
    mut raw_rx: mpsc::Receiver<notify::Result<Event>>,
    dirs: mpsc::UnboundedSender<PathBuf>,
    dropped: Arc<AtomicU64>,
    debouncer: Arc<Debouncer<H>>,
    cancel: CancellationToken,
) {
    let name = debouncer.handler().name().to_string();
    let mut reported = 0;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            res = raw_rx.recv() => {
                match res {
                    Some(Ok(event)) => handle_event(&dirs, &debouncer, event),
                    Some(Err(e)) => {
                        let err = WatchError::EventError {
                            details: e.to_string(),
                        };
                        tracing::warn!("[{name}] {err}");
                    }
                    None => break,
                }

                let total = dropped.load(Ordering::Relaxed);
                if total > reported {
                    tracing::warn!(
                        "[{name}] raw event queue overflowed, {} events dropped",
                        total - reported
                    );
                    reported = total;
                }
            }
        }
    }

    debouncer.close();
    crate::debug_event!(name, "worker exited");
}

fn handle_event<H: WatchHandler>(
    dirs: &mpsc::UnboundedSender<PathBuf>,
    debouncer: &Debouncer<H>,
    event: Event,
) {
    let handler = debouncer.handler();

    for raw in RawEvent::from_notify(&event) {
        if raw.op == FsOp::Create && handler.watch_new_dirs() && raw.path.is_dir() {
            // Closed only while the bus is stopping
            let _ = dirs.send(raw.path.clone());
        }

        if !handler.matches(&raw.path) {
            crate::debug_event!(handler.name(), "unmatched", "{} {}", raw.op, raw.path.display());
            continue;
        }

        debouncer.accept(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct AnyChange;

    #[async_trait]
    impl WatchHandler for AnyChange {
        type Signal = PathBuf;

        fn name(&self) -> &str {
            "any"
        }

        fn matches(&self, _path: &Path) -> bool {
            true
        }

        fn watch_new_dirs(&self) -> bool {
            true
        }

        async fn derive(&self, event: &RawEvent) -> Option<PathBuf> {
            Some(event.path.clone())
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_setup_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let result = DebouncedEventBus::<AnyChange>::builder(&missing).start(AnyChange);
        match result {
            Err(WatchError::SetupFailed { path, .. }) => assert_eq!(path, missing),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected setup failure"),
        }
    }

    #[tokio::test]
    async fn test_file_root_is_setup_error() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        let result = DebouncedEventBus::<AnyChange>::builder(&file).start(AnyChange);
        assert!(matches!(result, Err(WatchError::SetupFailed { .. })));
    }

    #[tokio::test]
    async fn test_burst_of_writes_yields_one_signal() {
        let temp_dir = TempDir::new().unwrap();
        let (bus, mut rx) = DebouncedEventBus::<AnyChange>::builder(temp_dir.path())
            .debounce_ms(100)
            .capacity(4)
            .start(AnyChange)
            .unwrap();

        for i in 0..5 {
            std::fs::write(temp_dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }

        let signal = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no signal")
            .expect("channel closed");
        assert!(signal.starts_with(temp_dir.path()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_subdirectory_is_watched() {
        let temp_dir = TempDir::new().unwrap();
        let (bus, mut rx) = DebouncedEventBus::<AnyChange>::builder(temp_dir.path())
            .debounce_ms(50)
            .capacity(4)
            .start(AnyChange)
            .unwrap();

        let sub = temp_dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, sub);

        std::fs::write(sub.join("inner.txt"), "x").unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, sub.join("inner.txt"));

        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let temp_dir = TempDir::new().unwrap();
        let (bus, mut rx) = DebouncedEventBus::<AnyChange>::builder(temp_dir.path())
            .debounce_ms(200)
            .start(AnyChange)
            .unwrap();

        std::fs::write(temp_dir.path().join("late.txt"), "x").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.shutdown().await;

        let end = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(end, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_directory_storm_does_not_stall_worker() {
        let temp_dir = TempDir::new().unwrap();
        let (bus, mut rx) = DebouncedEventBus::<AnyChange>::builder(temp_dir.path())
            .debounce_ms(50)
            .capacity(16)
            .start(AnyChange)
            .unwrap();

        // Far more creates than the raw channel holds, each one a new watch
        for i in 0..10_000 {
            std::fs::create_dir(temp_dir.path().join(format!("d{i:05}"))).unwrap();
        }

        let after = temp_dir.path().join("after.txt");
        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        let mut seen = false;
        while !seen && tokio::time::Instant::now() < deadline {
            std::fs::write(&after, "x").unwrap();
            let window = tokio::time::Instant::now() + Duration::from_millis(500);
            while let Ok(Some(signal)) = tokio::time::timeout_at(window, rx.recv()).await {
                if signal == after {
                    seen = true;
                    break;
                }
            }
        }
        assert!(seen, "worker stopped delivering after the burst");

        tokio::time::timeout(Duration::from_secs(10), bus.shutdown())
            .await
            .expect("shutdown hung");
    }
}
