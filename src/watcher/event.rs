//! Raw filesystem events as seen by the debouncer.

use std::fmt;
use std::path::PathBuf;

use notify::EventKind;
use notify::event::ModifyKind;

/// Operation reported by the OS watch source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
    Other,
}

impl FsOp {
    /// Map a notify event kind to an operation.
    ///
    /// Access events (open, read, close) are not changes and map to `None`.
    pub fn from_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FsOp::Create),
            EventKind::Modify(ModifyKind::Name(_)) => Some(FsOp::Rename),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(FsOp::Chmod),
            EventKind::Modify(_) => Some(FsOp::Write),
            EventKind::Remove(_) => Some(FsOp::Remove),
            EventKind::Access(_) => None,
            EventKind::Any | EventKind::Other => Some(FsOp::Other),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FsOp::Create => "create",
            FsOp::Write => "write",
            FsOp::Remove => "remove",
            FsOp::Rename => "rename",
            FsOp::Chmod => "chmod",
            FsOp::Other => "other",
        }
    }
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One path touched by one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub op: FsOp,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, op: FsOp) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Split a notify event into one raw event per path, in order.
    pub fn from_notify(event: &notify::Event) -> Vec<RawEvent> {
        let Some(op) = FsOp::from_kind(&event.kind) else {
            return Vec::new();
        };
        event
            .paths
            .iter()
            .map(|path| RawEvent::new(path.clone(), op))
            .collect()
    }
}
