// SPDX-License-Identifier: MIT

//! `SysinfoFileWatcher` (§4.10 component L): watches a single file and
//! invokes a callback once at startup and again on every event that
//! actually advances the file's mtime. A watch that errors out (the file
//! is removed, the underlying inotify/FEN handle breaks) tears itself
//! down and re-arms after a fixed backoff rather than propagating the
//! error to the caller.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use notify::{Event as NotifyEvent, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Delay before re-arming the watch after the underlying notifier breaks
/// (§4.10).
pub const WATCH_REARM_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    #[error("failed to install filesystem watch: {0}")]
    Notify(#[from] notify::Error),
}

/// Owns the background task watching `path`; dropping it stops the watch.
pub struct SysinfoFileWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl SysinfoFileWatcher {
    /// Spawns the watch loop. `on_change` is called once immediately and
    /// again every time `path`'s mtime advances.
    pub fn spawn<F>(path: impl Into<PathBuf>, on_change: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let path = path.into();
        let handle = tokio::spawn(watch_loop(path, on_change));
        Self { handle }
    }
}

impl Drop for SysinfoFileWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn watch_loop<F>(path: PathBuf, mut on_change: F)
where
    F: FnMut() + Send + 'static,
{
    on_change();
    let mut last_mtime = stat_mtime(&path).await;

    loop {
        match arm(&path) {
            Ok((_watcher, mut events)) => {
                while let Some(()) = events.recv().await {
                    match stat_mtime(&path).await {
                        Some(mtime) if Some(mtime) != last_mtime => {
                            last_mtime = Some(mtime);
                            on_change();
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
            }
            Err(error) => {
                tracing::debug!(path = %path.display(), %error, "sysinfo file watch failed to arm");
            }
        }
        tokio::time::sleep(WATCH_REARM_BACKOFF).await;
    }
}

/// Installs a `notify` watch on `path`'s parent directory (watching the
/// file itself misses the remove+recreate pattern config management
/// tools use) and returns a channel fed by every event concerning it.
fn arm(path: &Path) -> Result<(notify::RecommendedWatcher, mpsc::UnboundedReceiver<()>), WatcherError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let target = path.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
        if let Ok(event) = res {
            if event.paths.iter().any(|p| p == &target) {
                let _ = tx.send(());
            }
        }
    })?;
    let watch_dir = path.parent().unwrap_or(path);
    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok((watcher, rx))
}

async fn stat_mtime(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path).await.ok()?.modified().ok()
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
