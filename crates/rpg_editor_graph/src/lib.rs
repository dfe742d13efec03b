// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event graph engine for the RPG editor.
//!
//! Authors build branching event scripts as a directed graph of commands.
//! This crate provides:
//! - The command catalog, parsed from script file headers
//! - The event document and the editable graph model
//! - A force-directed, interactive graph surface drawn with egui
//!
//! ## Architecture
//!
//! [`EventGraph`] is the only place structural edits happen. The surface
//! derives a [`GraphLayout`] from it with the pure [`recompute`] whenever an
//! edit marks it dirty, and reports edits and refused links to the host as
//! [`SurfaceEvent`]s. [`EditorSession`] ties a catalog, a graph and a surface
//! together for one authoring root.

pub mod catalog;
pub mod document;
pub mod geometry;
pub mod graph;
pub mod layout;
pub mod session;
pub mod surface;
pub mod ui;

pub use catalog::{CatalogConfig, CatalogParseError, CommandCatalog, CommandDescriptor};
pub use document::{AdjacencyRow, DocumentError, EventDocument, NodeInstance};
pub use geometry::{NodeMetrics, NodeStyle, TextMeasure};
pub use graph::{EventGraph, GraphEditError, InvalidTargetReason, Link, NodeHandle};
pub use layout::{recompute, ForceLayout, GraphLayout, LayoutConfig};
pub use session::{CatalogTicket, EditorSession};
pub use surface::{GraphSurface, Interaction, PointerButton, PointerEvent, SurfaceConfig, SurfaceEvent};
