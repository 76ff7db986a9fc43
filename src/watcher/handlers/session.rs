//! Handler for agent session directories.
//!
//! Watches a flat directory of `session-<id>.json` files and turns each
//! debounced change into a typed [`SessionEvent`]. The session id is read
//! from the file body (`sessionId`), not from the file name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::watcher::{DebouncedEventBus, FsOp, RawEvent, WatchError, WatchHandler};

const SESSION_PREFIX: &str = "session-";
const SESSION_SUFFIX: &str = ".json";

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    MessageAdded,
    Updated,
}

/// Typed event for the session analytics plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub kind: SessionEventKind,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Only the id is read; every other field of a session file is ignored.
#[derive(Debug, Deserialize)]
struct SessionHeader {
    #[serde(rename = "sessionId", default)]
    session_id: String,
}

#[derive(Debug, Error)]
enum SessionFileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no sessionId in {path}")]
    MissingId { path: PathBuf },
}

/// Check whether a file name follows the `session-*.json` convention.
pub fn is_session_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(SESSION_PREFIX) && name.ends_with(SESSION_SUFFIX))
}

/// Map the window's last operation to an event kind.
///
/// Removal is not a reportable session event.
pub fn classify(op: FsOp) -> Option<SessionEventKind> {
    match op {
        FsOp::Create => Some(SessionEventKind::Created),
        FsOp::Write => Some(SessionEventKind::MessageAdded),
        FsOp::Remove => None,
        FsOp::Rename | FsOp::Chmod | FsOp::Other => Some(SessionEventKind::Updated),
    }
}

/// Read a session file and extract its `sessionId`.
async fn read_session_id(path: &Path) -> Result<String, SessionFileError> {
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| SessionFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let header: SessionHeader =
        serde_json::from_slice(&data).map_err(|source| SessionFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    if header.session_id.is_empty() {
        return Err(SessionFileError::MissingId {
            path: path.to_path_buf(),
        });
    }
    Ok(header.session_id)
}

/// Classifies session file changes into [`SessionEvent`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SessionEventClassifier;

impl SessionEventClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WatchHandler for SessionEventClassifier {
    type Signal = SessionEvent;

    fn name(&self) -> &str {
        "sessions"
    }

    fn matches(&self, path: &Path) -> bool {
        is_session_file(path)
    }

    async fn derive(&self, event: &RawEvent) -> Option<SessionEvent> {
        let kind = classify(event.op)?;

        match read_session_id(&event.path).await {
            Ok(session_id) => Some(SessionEvent { kind, session_id }),
            Err(e) => {
                crate::debug_event!("sessions", "skipped", "{e}");
                None
            }
        }
    }
}

/// Start watching a session directory.
///
/// Returns the bus (keep it alive) and the event receiver.
pub fn watch_sessions(
    dir: impl Into<PathBuf>,
    settings: &Settings,
) -> Result<(DebouncedEventBus<SessionEventClassifier>, mpsc::Receiver<SessionEvent>), WatchError> {
    DebouncedEventBus::<SessionEventClassifier>::builder(dir)
        .debounce_ms(settings.watch.debounce_ms)
        .capacity(settings.sessions.capacity)
        .start(SessionEventClassifier::new())
}
