// SPDX-License-Identifier: MIT OR Apache-2.0
//! Watches the command directory so script edits reload the catalog.

use notify_debouncer_full::{
    new_debouncer,
    notify::{self, EventKind, RecommendedWatcher, RecursiveMode},
    DebounceEventResult, Debouncer, RecommendedCache,
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::Duration;

/// Change notification from the watcher thread
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptEvent {
    /// A command script was created, modified or removed
    Changed(PathBuf),
    /// The watcher reported an error
    Error(String),
}

/// Debounced watcher over one command directory
pub struct CatalogWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    event_rx: Receiver<ScriptEvent>,
    dir: PathBuf,
}

impl CatalogWatcher {
    /// Start watching `dir` for scripts with `extension`
    pub fn new(dir: &Path, extension: &str, debounce: Duration) -> Result<Self, notify::Error> {
        let (event_tx, event_rx) = mpsc::channel();
        let extension = extension.to_string();

        let mut debouncer = new_debouncer(debounce, None, move |result: DebounceEventResult| match result {
            Ok(events) => {
                for event in events {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        continue;
                    }
                    for path in event.paths.iter().filter(|p| is_script(p, &extension)) {
                        let _ = event_tx.send(ScriptEvent::Changed(path.clone()));
                    }
                }
            }
            Err(errors) => {
                for error in errors {
                    let _ = event_tx.send(ScriptEvent::Error(error.to_string()));
                }
            }
        })?;

        debouncer.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!("Watching command scripts in {:?}", dir);

        Ok(Self {
            _debouncer: debouncer,
            event_rx,
            dir: dir.to_path_buf(),
        })
    }

    /// Drain pending events; returns whether any script changed
    pub fn poll_changed(&self) -> bool {
        let mut changed = false;
        loop {
            match self.event_rx.try_recv() {
                Ok(ScriptEvent::Changed(path)) => {
                    tracing::debug!("Command script changed: {:?}", path);
                    changed = true;
                }
                Ok(ScriptEvent::Error(e)) => tracing::warn!("Watcher error in {:?}: {}", self.dir, e),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::warn!("Command watcher channel disconnected");
                    break;
                }
            }
        }
        changed
    }

    /// Watched directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn is_script(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == extension)
}
