//! Sessions command.

use std::path::PathBuf;

use anyhow::Context;

use crate::config::Settings;
use crate::watcher::handlers::watch_sessions;

/// Run sessions command - print each session event as one JSON line until
/// interrupted.
pub async fn run_sessions(dir: Option<PathBuf>, settings: &Settings) -> anyhow::Result<()> {
    let dir = dir
        .or_else(|| settings.sessions.dir.clone())
        .context("No session directory: pass DIR or set sessions.dir")?;

    let (bus, mut events) = watch_sessions(dir.clone(), settings)
        .with_context(|| format!("Cannot watch {}", dir.display()))?;
    crate::log_event!("sessions", "watching", "{}", dir.display());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
        }
    }

    bus.shutdown().await;
    Ok(())
}
