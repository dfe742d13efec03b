// SPDX-License-Identifier: MIT OR Apache-2.0
//! Background catalog loading.
//!
//! Each request runs on its own thread and reports back with the ticket it was
//! issued for; the session decides whether the result is still wanted.

use rpg_editor_graph::{CatalogConfig, CatalogTicket, CommandCatalog};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

/// A finished load
pub type LoadedCatalog = (CatalogTicket, CommandCatalog);

/// Runs catalog loads off the UI thread
pub struct CatalogLoader {
    result_tx: Sender<LoadedCatalog>,
    result_rx: Receiver<LoadedCatalog>,
}

impl CatalogLoader {
    /// Create an idle loader
    pub fn new() -> Self {
        let (result_tx, result_rx) = mpsc::channel();
        Self { result_tx, result_rx }
    }

    /// Start loading the catalog a ticket refers to
    pub fn request(&self, ticket: CatalogTicket, config: CatalogConfig) {
        let tx = self.result_tx.clone();
        tracing::debug!("Loading catalog generation {} from {:?}", ticket.generation, ticket.root);

        let spawned = std::thread::Builder::new()
            .name("catalog-loader".to_string())
            .spawn(move || {
                let catalog = CommandCatalog::load(&ticket.root, &config);
                let _ = tx.send((ticket, catalog));
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to start catalog loader thread: {e}");
        }
    }

    /// Collect finished loads (non-blocking)
    pub fn poll(&self) -> Vec<LoadedCatalog> {
        let mut loaded = Vec::new();
        loop {
            match self.result_rx.try_recv() {
                Ok(result) => loaded.push(result),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        loaded
    }

    /// Wait for the next finished load
    #[cfg(test)]
    pub fn wait(&self, timeout: std::time::Duration) -> Option<LoadedCatalog> {
        self.result_rx.recv_timeout(timeout).ok()
    }
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpg_editor_graph::EditorSession;
    use std::time::Duration;

    fn write_command(root: &std::path::Path, id: &str) {
        let dir = root.join("data").join("commands");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{id}.py")),
            "# name: Wait\n# params: [frames]\n# nexts: [Next]\ndef execute(frames):\n    pass\n",
        )
        .unwrap();
    }

    #[test]
    fn test_only_latest_load_is_installed() {
        let old_root = tempfile::tempdir().unwrap();
        let new_root = tempfile::tempdir().unwrap();
        write_command(old_root.path(), "wait");
        write_command(new_root.path(), "wait");
        write_command(new_root.path(), "pause");

        let loader = CatalogLoader::new();
        let mut session = EditorSession::default();
        let stale = session.open_root(old_root.path());
        let current = session.open_root(new_root.path());
        loader.request(stale, CatalogConfig::default());
        loader.request(current, CatalogConfig::default());

        let mut installed = 0;
        for _ in 0..2 {
            let (ticket, catalog) = loader.wait(Duration::from_secs(5)).unwrap();
            if session.accept_catalog(&ticket, catalog) {
                installed += 1;
            }
        }
        assert_eq!(installed, 1);
        assert_eq!(session.catalog().len(), 2);
        assert!(loader.poll().is_empty());
    }
}
