// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor session: the active authoring root, its catalog and the open event.
//!
//! Catalog loads may finish out of order when the root changes quickly.
//! [`EditorSession::open_root`] hands out a [`CatalogTicket`] and only the
//! catalog delivered with the current ticket is installed.

use crate::catalog::{CatalogConfig, CommandCatalog};
use crate::document::{EventDocument, NodeInstance};
use crate::graph::{EventGraph, GraphEditError, NodeHandle};
use crate::surface::{GraphSurface, SurfaceConfig, SurfaceEvent};
use std::path::{Path, PathBuf};

/// Identifies one catalog load request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTicket {
    /// Load generation
    pub generation: u64,
    /// Authoring root the load reads from
    pub root: PathBuf,
}

/// One editing session
pub struct EditorSession {
    root: Option<PathBuf>,
    catalog_config: CatalogConfig,
    catalog: CommandCatalog,
    catalog_generation: u64,
    graph: EventGraph,
    document_generation: u64,
    surface: GraphSurface,
    dirty: bool,
}

impl EditorSession {
    /// Create a session with no root and an empty Root-only document
    pub fn new(catalog_config: CatalogConfig, surface_config: SurfaceConfig) -> Self {
        Self {
            root: None,
            catalog_config,
            catalog: CommandCatalog::default(),
            catalog_generation: 0,
            graph: EventGraph::default(),
            document_generation: 0,
            surface: GraphSurface::new(surface_config),
            dirty: false,
        }
    }

    /// Switch the authoring root and request a fresh catalog for it
    pub fn open_root(&mut self, root: impl Into<PathBuf>) -> CatalogTicket {
        let root = root.into();
        tracing::info!("Opening authoring root {:?}", root);
        self.root = Some(root);
        self.next_catalog_ticket()
    }

    /// Request a fresh catalog for the current root
    pub fn reload_catalog(&mut self) -> Option<CatalogTicket> {
        self.root.is_some().then(|| self.next_catalog_ticket())
    }

    fn next_catalog_ticket(&mut self) -> CatalogTicket {
        self.catalog_generation += 1;
        CatalogTicket {
            generation: self.catalog_generation,
            root: self.root.clone().unwrap_or_default(),
        }
    }

    /// Install a loaded catalog if its ticket is still current.
    ///
    /// Returns whether the catalog was installed.
    pub fn accept_catalog(&mut self, ticket: &CatalogTicket, catalog: CommandCatalog) -> bool {
        let current = ticket.generation == self.catalog_generation
            && self.root.as_deref() == Some(ticket.root.as_path());
        if !current {
            tracing::debug!(
                "Discarding stale catalog (generation {}, current {})",
                ticket.generation,
                self.catalog_generation
            );
            return false;
        }

        tracing::info!("Catalog ready: {} commands", catalog.len());
        self.catalog = catalog;
        self.surface.mark_dirty();
        true
    }

    /// Load the catalog for a ticket on the calling thread
    pub fn load_catalog(&self, ticket: &CatalogTicket) -> CommandCatalog {
        CommandCatalog::load(&ticket.root, &self.catalog_config)
    }

    /// Replace the open document; `None` opens a fresh Root-only event
    pub fn open_document(&mut self, document: Option<EventDocument>) {
        let document = document.unwrap_or_default();
        self.graph = EventGraph::from_document(&document);
        self.document_generation += 1;
        self.surface.reset();
        self.surface.take_events();
        self.dirty = false;
        tracing::info!(
            "Editing event {:?} ({} nodes, generation {})",
            self.graph.name,
            self.graph.node_count(),
            self.document_generation
        );
    }

    /// Serialize the open document
    pub fn document(&self) -> EventDocument {
        self.graph.to_document()
    }

    /// Drain surface events, tracking unsaved changes
    pub fn poll_events(&mut self) -> Vec<SurfaceEvent> {
        let events = self.surface.take_events();
        if events.contains(&SurfaceEvent::DocumentChanged) {
            self.dirty = true;
        }
        events
    }

    /// Bind a parameter of the open document
    pub fn bind_param(&mut self, node: NodeHandle, index: usize, value: impl Into<String>) -> Result<(), GraphEditError> {
        self.surface.bind_param(&mut self.graph, &self.catalog, node, index, value)
    }

    /// Clear one branch slot of the open document
    pub fn disconnect(&mut self, node: NodeHandle, branch: usize) -> Result<Option<NodeHandle>, GraphEditError> {
        self.surface.disconnect(&mut self.graph, node, branch)
    }

    /// Remove a node from the open document
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<NodeInstance, GraphEditError> {
        self.surface.remove_node(&mut self.graph, node)
    }

    /// Show the graph surface
    pub fn ui(&mut self, ui: &mut egui::Ui) -> egui::Response {
        self.surface.show(ui, &mut self.graph, &self.catalog)
    }

    /// Whether the document has unsaved edits
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Record that the document was written out
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// Current authoring root
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Current catalog
    pub fn catalog(&self) -> &CommandCatalog {
        &self.catalog
    }

    /// Catalog loader settings
    pub fn catalog_config(&self) -> &CatalogConfig {
        &self.catalog_config
    }

    /// Open graph
    pub fn graph(&self) -> &EventGraph {
        &self.graph
    }

    /// Graph surface
    pub fn surface(&self) -> &GraphSurface {
        &self.surface
    }

    /// Mutable graph surface
    pub fn surface_mut(&mut self) -> &mut GraphSurface {
        &mut self.surface
    }

    /// Generation of the open document, bumped by every [`Self::open_document`]
    pub fn document_generation(&self) -> u64 {
        self.document_generation
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(CatalogConfig::default(), SurfaceConfig::default())
    }
}
