//! Underlying document file watch.
//!
//! Watches the stable encrypted document for external edits so the engine
//! can drop its snapshot and announce the change.

use crate::error::FsError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tracing::error;

fn watch_error(action: &str, e: notify::Error) -> FsError {
    FsError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("failed to {}: {}", action, e),
    ))
}

/// Watch the document's parent directory (non-recursive), invoking the
/// callback whenever the document itself changes. Dropping the returned
/// watcher releases the subscription.
pub fn watch_document(
    document: &Path,
    on_change: impl Fn() + Send + 'static,
) -> Result<RecommendedWatcher, FsError> {
    let target = document.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                let relevant = matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                );
                if relevant && event.paths.iter().any(|path| path == &target) {
                    on_change();
                }
            }
            Err(e) => error!("document watch error: {}", e),
        }
    })
    .map_err(|e| watch_error("create watcher", e))?;

    let directory = document.parent().filter(|p| !p.as_os_str().is_empty());
    watcher
        .watch(
            directory.unwrap_or_else(|| Path::new(".")),
            RecursiveMode::NonRecursive,
        )
        .map_err(|e| watch_error("watch document directory", e))?;

    Ok(watcher)
}
