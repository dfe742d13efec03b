// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialized event document.
//!
//! This is the on-disk shape of one event. Node references are positions in
//! `orders`; position 0 is always the Root pseudo-node.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Command id stored for the Root pseudo-node
pub const ROOT_COMMAND_ID: &str = "Root";

/// One placed command inside an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Command id this node runs
    #[serde(rename = "id")]
    pub command_id: String,
    /// Bound parameter values, in the command's parameter order
    #[serde(rename = "params", default)]
    pub bound_params: Vec<String>,
}

impl NodeInstance {
    /// The Root pseudo-node
    pub fn root() -> Self {
        Self {
            command_id: ROOT_COMMAND_ID.to_string(),
            bound_params: Vec::new(),
        }
    }

    /// A node with `param_count` empty parameter values
    pub fn new(command_id: impl Into<String>, param_count: usize) -> Self {
        Self {
            command_id: command_id.into(),
            bound_params: vec![String::new(); param_count],
        }
    }
}

/// Branch targets of a single source node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyRow {
    /// Source position in `orders`
    pub from: usize,
    /// One slot per branch; `None` means not yet connected
    pub to: Vec<Option<usize>>,
}

/// An event as the surrounding editor stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDocument {
    /// Event id
    #[serde(default)]
    pub id: String,
    /// Event name
    #[serde(default)]
    pub name: String,
    /// Trigger condition, opaque to the graph
    #[serde(default)]
    pub appear: String,
    /// Placed commands; index 0 is Root
    #[serde(default)]
    pub orders: Vec<NodeInstance>,
    /// Branch targets per source node
    #[serde(default)]
    pub adjacency: Vec<AdjacencyRow>,
}

impl Default for EventDocument {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl EventDocument {
    /// A fresh document containing only Root
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            appear: String::new(),
            orders: vec![NodeInstance::root()],
            adjacency: Vec::new(),
        }
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a document from disk
    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let json = std::fs::read_to_string(path)?;
        let doc = Self::from_json(&json)?;
        tracing::info!("Loaded event {:?} ({} nodes) from {:?}", doc.name, doc.orders.len(), path);
        Ok(doc)
    }

    /// Write a document to disk, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::info!("Saved event {:?} to {:?}", self.name, path);
        Ok(())
    }
}

/// Error reading or writing an event document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_has_root() {
        let doc = EventDocument::new("ev1", "Opening");
        assert_eq!(doc.orders, vec![NodeInstance::root()]);
        assert!(doc.adjacency.is_empty());
    }

    #[test]
    fn test_field_names() {
        let mut doc = EventDocument::new("ev1", "Opening");
        doc.appear = "switch:1".to_string();
        doc.orders.push(NodeInstance {
            command_id: "say".to_string(),
            bound_params: vec!["hello".to_string()],
        });
        doc.adjacency.push(AdjacencyRow { from: 0, to: vec![Some(1)] });
        doc.adjacency.push(AdjacencyRow { from: 1, to: vec![None] });

        let value: serde_json::Value = serde_json::from_str(&doc.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["id"], "ev1");
        assert_eq!(value["appear"], "switch:1");
        assert_eq!(value["orders"][1]["id"], "say");
        assert_eq!(value["orders"][1]["params"][0], "hello");
        assert_eq!(value["adjacency"][0]["from"], 0);
        assert_eq!(value["adjacency"][0]["to"][0], 1);
        assert!(value["adjacency"][1]["to"][0].is_null());

        let back = EventDocument::from_json(&value.to_string()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_missing_optional_fields() {
        let doc = EventDocument::from_json(r#"{"id":"e","name":"n","orders":[{"id":"Root"}]}"#).unwrap();
        assert_eq!(doc.appear, "");
        assert!(doc.adjacency.is_empty());
        assert!(doc.orders[0].bound_params.is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events").join("ev.json");
        let doc = EventDocument::new("ev", "Saved");
        doc.save(&path).unwrap();
        assert_eq!(EventDocument::load(&path).unwrap(), doc);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            EventDocument::from_json("{ not json"),
            Err(DocumentError::Json(_))
        ));
    }
}
