// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor settings stored next to the authoring root.

use rpg_editor_graph::{CatalogConfig, SurfaceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Settings file name, relative to the authoring root
pub const CONFIG_FILE_NAME: &str = "rpg_editor.ron";

/// Errors reading or writing the settings file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file is not valid RON
    #[error("Invalid settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be written as RON
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),
}

/// Editor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Command script discovery
    pub catalog: CatalogConfig,
    /// Graph surface and layout
    pub surface: SurfaceConfig,
    /// Event document directory, relative to the authoring root
    pub events_dir: PathBuf,
    /// Quiet period before a command script change triggers a reload
    pub watch_debounce_ms: u64,
    /// Initial window size in logical pixels
    pub window_size: [u32; 2],
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            surface: SurfaceConfig::default(),
            events_dir: PathBuf::from("data").join("events"),
            watch_debounce_ms: 250,
            window_size: [1280, 800],
        }
    }
}

impl EditorConfig {
    /// Settings file path for an authoring root
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE_NAME)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&content)?)
    }

    /// Load the root's settings, falling back to defaults when absent or broken
    pub fn load_or_default(root: &Path) -> Self {
        let path = Self::path_for(root);
        if !path.exists() {
            tracing::info!("No {} in {:?}, using default settings", CONFIG_FILE_NAME, root);
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => {
                tracing::info!("Loaded settings from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Ignoring {:?}: {e}", path);
                Self::default()
            }
        }
    }

    /// Write settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where a new, unnamed event is saved
    pub fn untitled_event_path(&self, root: &Path) -> PathBuf {
        root.join(&self.events_dir).join("untitled.json")
    }
}
