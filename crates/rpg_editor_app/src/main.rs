// SPDX-License-Identifier: MIT OR Apache-2.0
//! RPG Editor - event graph authoring tool
//!
//! Opens an authoring root, loads the command catalog from its scripts and
//! edits one event document as an interactive graph:
//! - Command catalog with live reload when scripts change
//! - Force-directed layout with draggable and pinnable nodes
//! - Click-to-link branch editing and a node inspector
//!
//! ## Usage
//!
//! ```text
//! rpg_editor <authoring-root> [event.json]
//! ```

mod app;
mod catalog_loader;
mod catalog_watcher;
mod config;
mod notifications;

use app::EditorApp;
use config::EditorConfig;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("rpg_editor_app=debug,rpg_editor_graph=debug,wgpu=warn,naga=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting RPG Editor v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args_os().skip(1);
    let Some(root) = args.next().map(PathBuf::from) else {
        eprintln!("usage: rpg_editor <authoring-root> [event.json]");
        std::process::exit(2);
    };

    let config = EditorConfig::load_or_default(&root);
    let document_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.untitled_event_path(&root));

    if let Err(e) = EditorApp::run(root, document_path, config) {
        tracing::error!("Editor crashed: {e}");
        std::process::exit(1);
    }
}
