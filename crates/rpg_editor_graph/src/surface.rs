// SPDX-License-Identifier: MIT OR Apache-2.0
//! Interactive graph surface.
//!
//! Owns everything derived from the model for display: the render layout, the
//! physics positions, the view transform and the pointer interaction state.
//! Pointer input arrives as [`PointerEvent`]s in canvas-local screen
//! coordinates, which keeps the state machine independent of egui and easy
//! to drive from tests.
//!
//! Structural edits go through [`EventGraph`]; every successful edit marks the
//! surface dirty and queues [`SurfaceEvent::DocumentChanged`]. Refused links
//! are reported as [`SurfaceEvent::LinkRejected`].

use crate::catalog::CommandCatalog;
use crate::document::NodeInstance;
use crate::geometry::NodeStyle;
use crate::graph::{EventGraph, GraphEditError, NodeHandle};
use crate::layout::{recompute, ForceLayout, GraphLayout, LayoutConfig};
use egui::{Pos2, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Surface settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Screen-space radius within which an output port counts as hot
    pub port_hit_radius: f32,
    /// Smallest zoom factor
    pub min_zoom: f32,
    /// Largest zoom factor
    pub max_zoom: f32,
    /// Zoom change per scroll unit
    pub zoom_speed: f32,
    /// Node box typography
    pub style: NodeStyle,
    /// Auto-layout physics
    pub layout: LayoutConfig,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            port_hit_radius: 8.0,
            min_zoom: 0.1,
            max_zoom: 4.0,
            zoom_speed: 0.001,
            style: NodeStyle::default(),
            layout: LayoutConfig::default(),
        }
    }
}

/// Mapping between graph space and canvas-local screen space.
///
/// `screen = graph * zoom + pan`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    /// Screen offset of the graph origin
    pub pan: Vec2,
    /// Scale factor
    pub zoom: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl ViewTransform {
    /// Convert a graph position to screen space
    pub fn graph_to_screen(&self, pos: Pos2) -> Pos2 {
        (pos.to_vec2() * self.zoom + self.pan).to_pos2()
    }

    /// Convert a screen position to graph space
    pub fn screen_to_graph(&self, pos: Pos2) -> Pos2 {
        ((pos.to_vec2() - self.pan) / self.zoom).to_pos2()
    }

    /// Scale by `factor`, keeping the graph point under `anchor` fixed
    pub fn zoom_about(&mut self, anchor: Pos2, factor: f32, min: f32, max: f32) {
        let new_zoom = (self.zoom * factor).clamp(min, max);
        let ratio = new_zoom / self.zoom;
        self.pan = anchor.to_vec2() - (anchor.to_vec2() - self.pan) * ratio;
        self.zoom = new_zoom;
    }
}

/// One output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    /// Owning node
    pub node: NodeHandle,
    /// Branch index
    pub branch: usize,
}

/// The output port nearest the pointer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotPort {
    /// Port
    pub port: PortRef,
    /// Port position on screen
    pub screen_pos: Pos2,
}

/// A link being drawn from an output port
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingLink {
    /// Source node
    pub source: NodeHandle,
    /// Source branch
    pub branch: usize,
    /// Screen position of the source port, refreshed every frame
    pub anchor: Pos2,
    /// Last pointer position
    pub pointer: Pos2,
}

/// Pointer interaction state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Interaction {
    /// Nothing in progress
    #[default]
    Idle,
    /// Rubber-banding a link from an output port
    LinkPending(PendingLink),
    /// Moving a node
    DraggingNode {
        /// Node being moved
        node: NodeHandle,
        /// Grab point relative to the node centre, in graph space
        grab_offset: Vec2,
    },
    /// Moving the view
    Panning {
        /// Previous pointer position
        last: Pos2,
    },
}

/// Pointer button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Left / main button
    Primary,
    /// Right / context button
    Secondary,
}

/// Pointer input in canvas-local screen coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    /// Button pressed
    Down {
        /// Pointer position
        pos: Pos2,
        /// Button
        button: PointerButton,
    },
    /// Pointer moved
    Move {
        /// Pointer position
        pos: Pos2,
    },
    /// Primary button released
    Up {
        /// Pointer position
        pos: Pos2,
    },
    /// Scroll wheel; positive `delta` zooms in
    Scroll {
        /// Pointer position
        pos: Pos2,
        /// Scroll amount
        delta: f32,
    },
    /// Pointer left the canvas
    Leave,
}

/// Notification for the host, drained with [`GraphSurface::take_events`]
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    /// The model was edited
    DocumentChanged,
    /// Selection changed
    SelectionChanged(Option<NodeHandle>),
    /// A link was refused
    LinkRejected(GraphEditError),
    /// The command picker was opened at a screen position
    ContextMenuRequested(Pos2),
}

/// Interactive view over one [`EventGraph`]
pub struct GraphSurface {
    config: SurfaceConfig,
    layout: GraphLayout,
    physics: ForceLayout,
    positions: HashMap<NodeHandle, Pos2>,
    view: ViewTransform,
    viewport_initialized: bool,
    interaction: Interaction,
    selected: Option<NodeHandle>,
    hot_port: Option<HotPort>,
    hovered_node: Option<NodeHandle>,
    pointer: Option<Pos2>,
    picker_at: Option<Pos2>,
    spawn: Option<(NodeHandle, Pos2)>,
    dirty: bool,
    events: Vec<SurfaceEvent>,
}

impl GraphSurface {
    /// Create a surface; the first frame builds the layout
    pub fn new(config: SurfaceConfig) -> Self {
        Self {
            config,
            layout: GraphLayout::default(),
            physics: ForceLayout::new(config.layout),
            positions: HashMap::new(),
            view: ViewTransform::default(),
            viewport_initialized: false,
            interaction: Interaction::Idle,
            selected: None,
            hot_port: None,
            hovered_node: None,
            pointer: None,
            picker_at: None,
            spawn: None,
            dirty: true,
            events: Vec::new(),
        }
    }

    /// Drop all derived state, e.g. after switching documents
    pub fn reset(&mut self) {
        let config = self.config;
        let events = std::mem::take(&mut self.events);
        *self = Self::new(config);
        self.events = events;
        tracing::debug!("Graph surface reset");
    }

    /// Request a layout rebuild on the next frame
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether a layout rebuild is pending
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Centre the graph origin in a viewport of `size` the first time it is known
    pub fn init_viewport(&mut self, size: Vec2) {
        if !self.viewport_initialized {
            self.view.pan = size / 2.0;
            self.viewport_initialized = true;
        }
    }

    /// Advance one frame: rebuild the layout if dirty, tick physics, refresh hover
    pub fn frame(&mut self, graph: &EventGraph, catalog: &CommandCatalog, dt: f32) {
        if self.dirty {
            self.layout = recompute(graph, catalog, &self.config.style);
            self.physics.sync(&self.layout, self.spawn.take());
            self.dirty = false;

            if self.selected.is_some_and(|node| !graph.contains(node)) {
                self.set_selection(None);
            }
        }

        self.physics.tick(dt);
        self.positions = self.physics.positions();
        self.refresh_hover();
    }

    /// Feed one pointer event
    pub fn handle_pointer(&mut self, graph: &mut EventGraph, catalog: &CommandCatalog, event: PointerEvent) {
        match event {
            PointerEvent::Move { pos } => self.pointer_moved(pos),
            PointerEvent::Down { pos, button: PointerButton::Primary } => {
                self.pointer = Some(pos);
                self.refresh_hover();
                self.primary_down(graph, catalog, pos);
            }
            PointerEvent::Down { pos, button: PointerButton::Secondary } => {
                self.pointer = Some(pos);
                if matches!(self.interaction, Interaction::LinkPending(_)) {
                    self.cancel_link();
                } else {
                    self.picker_at = Some(pos);
                    self.events.push(SurfaceEvent::ContextMenuRequested(pos));
                }
            }
            PointerEvent::Up { pos } => {
                self.pointer = Some(pos);
                self.primary_up(graph, catalog, pos);
            }
            PointerEvent::Scroll { pos, delta } => {
                let factor = (1.0 + delta * self.config.zoom_speed).max(0.1);
                self.view
                    .zoom_about(pos, factor, self.config.min_zoom, self.config.max_zoom);
                self.refresh_hover();
            }
            PointerEvent::Leave => {
                self.pointer = None;
                self.hot_port = None;
                self.hovered_node = None;
                if matches!(
                    self.interaction,
                    Interaction::DraggingNode { .. } | Interaction::Panning { .. }
                ) {
                    self.interaction = Interaction::Idle;
                }
            }
        }
    }

    fn pointer_moved(&mut self, pos: Pos2) {
        self.pointer = Some(pos);
        match &mut self.interaction {
            Interaction::LinkPending(pending) => pending.pointer = pos,
            Interaction::DraggingNode { node, grab_offset } => {
                let (node, center) = (*node, self.view.screen_to_graph(pos) - *grab_offset);
                self.pin_node(node, center);
                self.physics.restart();
            }
            Interaction::Panning { last } => {
                self.view.pan += pos - *last;
                *last = pos;
            }
            Interaction::Idle => {}
        }
        self.refresh_hover();
    }

    fn primary_down(&mut self, graph: &mut EventGraph, catalog: &CommandCatalog, pos: Pos2) {
        match self.interaction {
            Interaction::LinkPending(pending) => {
                self.interaction = Interaction::Idle;
                match self.node_at(pos) {
                    Some(target) => self.complete_link(graph, catalog, pending, target),
                    None => tracing::debug!("Link from {} aborted", pending.source),
                }
            }
            _ => {
                self.picker_at = None;
                if let Some(hot) = self.hot_port {
                    tracing::debug!("Link started from {} branch {}", hot.port.node, hot.port.branch);
                    self.interaction = Interaction::LinkPending(PendingLink {
                        source: hot.port.node,
                        branch: hot.port.branch,
                        anchor: hot.screen_pos,
                        pointer: pos,
                    });
                } else if let Some(node) = self.node_at(pos) {
                    self.set_selection(Some(node));
                    let center = self.positions.get(&node).copied().unwrap_or(Pos2::ZERO);
                    self.interaction = Interaction::DraggingNode {
                        node,
                        grab_offset: self.view.screen_to_graph(pos) - center,
                    };
                } else {
                    self.set_selection(None);
                    self.interaction = Interaction::Panning { last: pos };
                }
            }
        }
    }

    fn primary_up(&mut self, graph: &mut EventGraph, catalog: &CommandCatalog, pos: Pos2) {
        match self.interaction {
            Interaction::DraggingNode { .. } | Interaction::Panning { .. } => {
                self.interaction = Interaction::Idle;
            }
            // Releasing over another node completes a drag-style link; anywhere
            // else leaves the link pending for a click on the target.
            Interaction::LinkPending(pending) => {
                if let Some(target) = self.node_at(pos).filter(|target| *target != pending.source) {
                    self.interaction = Interaction::Idle;
                    self.complete_link(graph, catalog, pending, target);
                }
            }
            Interaction::Idle => {}
        }
    }

    fn complete_link(
        &mut self,
        graph: &mut EventGraph,
        catalog: &CommandCatalog,
        pending: PendingLink,
        target: NodeHandle,
    ) {
        if graph.target_of(pending.source, pending.branch) == Some(target) {
            return;
        }
        match graph.connect(catalog, pending.source, pending.branch, target) {
            Ok(()) => {
                self.dirty = true;
                self.events.push(SurfaceEvent::DocumentChanged);
            }
            Err(err) => {
                tracing::debug!("Link rejected: {}", err);
                self.events.push(SurfaceEvent::LinkRejected(err));
            }
        }
    }

    /// Abandon a pending link without touching the model
    pub fn cancel_link(&mut self) {
        if let Interaction::LinkPending(pending) = self.interaction {
            tracing::debug!("Link from {} cancelled", pending.source);
            self.interaction = Interaction::Idle;
        }
    }

    /// Add a node for the command with `display_name`, spawning it under `screen_pos`
    pub fn insert_command(
        &mut self,
        graph: &mut EventGraph,
        catalog: &CommandCatalog,
        display_name: &str,
        screen_pos: Pos2,
    ) -> Result<NodeHandle, GraphEditError> {
        let command = catalog
            .by_display_name(display_name)
            .ok_or_else(|| GraphEditError::MissingCommand(display_name.to_string()))?;
        let node = graph.create_node(catalog, &command.id)?;

        self.spawn = Some((node, self.view.screen_to_graph(screen_pos)));
        self.picker_at = None;
        self.dirty = true;
        self.events.push(SurfaceEvent::DocumentChanged);
        self.set_selection(Some(node));
        Ok(node)
    }

    /// Bind a parameter value through the model
    pub fn bind_param(
        &mut self,
        graph: &mut EventGraph,
        catalog: &CommandCatalog,
        node: NodeHandle,
        index: usize,
        value: impl Into<String>,
    ) -> Result<(), GraphEditError> {
        graph.bind_param(catalog, node, index, value)?;
        self.dirty = true;
        self.events.push(SurfaceEvent::DocumentChanged);
        Ok(())
    }

    /// Clear one branch slot
    pub fn disconnect(
        &mut self,
        graph: &mut EventGraph,
        node: NodeHandle,
        branch: usize,
    ) -> Result<Option<NodeHandle>, GraphEditError> {
        let removed = graph.disconnect(node, branch)?;
        if removed.is_some() {
            self.dirty = true;
            self.events.push(SurfaceEvent::DocumentChanged);
        }
        Ok(removed)
    }

    /// Remove the selected node. Root and an empty selection are left alone.
    pub fn delete_selected(&mut self, graph: &mut EventGraph) -> Result<Option<NodeInstance>, GraphEditError> {
        let Some(node) = self.selected.filter(|node| !node.is_root()) else {
            return Ok(None);
        };
        self.remove_node(graph, node).map(Some)
    }

    /// Remove a node through the model. Selection and interaction are only
    /// touched once the model accepted the removal.
    pub fn remove_node(&mut self, graph: &mut EventGraph, node: NodeHandle) -> Result<NodeInstance, GraphEditError> {
        let removed = graph.remove_node(node)?;

        if matches!(self.interaction, Interaction::LinkPending(p) if p.source == node)
            || matches!(self.interaction, Interaction::DraggingNode { node: n, .. } if n == node)
        {
            self.interaction = Interaction::Idle;
        }
        if self.selected == Some(node) {
            self.set_selection(None);
        }
        self.dirty = true;
        self.events.push(SurfaceEvent::DocumentChanged);
        Ok(removed)
    }

    /// Move a node to a graph position and pin it there
    pub fn pin_node(&mut self, node: NodeHandle, center: Pos2) {
        self.physics.set_position(node, center, true);
        if self.positions.contains_key(&node) {
            self.positions.insert(node, center);
        }
    }

    /// Drain queued events
    pub fn take_events(&mut self) -> Vec<SurfaceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Nearest output port within the hit radius of a screen position
    pub fn hot_port_at(&self, pos: Pos2) -> Option<HotPort> {
        let radius = self.config.port_hit_radius;
        let mut best: Option<(f32, HotPort)> = None;

        for node in &self.layout.nodes {
            let Some(center) = self.positions.get(&node.handle) else {
                continue;
            };
            for branch in 0..node.metrics.output_ports.len() {
                let Some(port) = node.metrics.output_port(*center, branch) else {
                    continue;
                };
                let screen_pos = self.view.graph_to_screen(port);
                let distance = screen_pos.distance(pos);
                if distance > radius {
                    continue;
                }
                if best.as_ref().map_or(true, |(d, _)| distance < *d) {
                    best = Some((
                        distance,
                        HotPort {
                            port: PortRef { node: node.handle, branch },
                            screen_pos,
                        },
                    ));
                }
            }
        }

        best.map(|(_, hot)| hot)
    }

    /// Topmost node whose box contains a screen position
    pub fn node_at(&self, pos: Pos2) -> Option<NodeHandle> {
        let graph_pos = self.view.screen_to_graph(pos);
        self.layout.nodes.iter().rev().find_map(|node| {
            let center = self.positions.get(&node.handle)?;
            node.metrics
                .rect(*center)
                .contains(graph_pos)
                .then_some(node.handle)
        })
    }

    /// Screen position of an output port at the current positions
    pub fn port_screen_pos(&self, port: PortRef) -> Option<Pos2> {
        let center = self.positions.get(&port.node)?;
        let node = self.layout.node(port.node)?;
        node.metrics
            .output_port(*center, port.branch)
            .map(|p| self.view.graph_to_screen(p))
    }

    fn refresh_hover(&mut self) {
        if let Interaction::LinkPending(pending) = self.interaction {
            let port = PortRef { node: pending.source, branch: pending.branch };
            match self.port_screen_pos(port) {
                Some(anchor) => {
                    self.interaction = Interaction::LinkPending(PendingLink { anchor, ..pending });
                }
                None if !self.dirty => {
                    tracing::debug!("Link source {} vanished", pending.source);
                    self.interaction = Interaction::Idle;
                }
                None => {}
            }
        }

        match self.pointer {
            Some(pos) => {
                self.hot_port = self.hot_port_at(pos);
                self.hovered_node = self.node_at(pos);
            }
            None => {
                self.hot_port = None;
                self.hovered_node = None;
            }
        }
    }

    fn set_selection(&mut self, node: Option<NodeHandle>) {
        if self.selected != node {
            self.selected = node;
            self.events.push(SurfaceEvent::SelectionChanged(node));
        }
    }

    /// Select a node programmatically
    pub fn select(&mut self, node: Option<NodeHandle>) {
        self.set_selection(node);
    }

    /// Close the command picker
    pub fn close_picker(&mut self) {
        self.picker_at = None;
    }

    /// Screen position the command picker was opened at
    pub fn picker_at(&self) -> Option<Pos2> {
        self.picker_at
    }

    /// Current render layout
    pub fn layout(&self) -> &GraphLayout {
        &self.layout
    }

    /// Current graph-space centre of a node
    pub fn position(&self, node: NodeHandle) -> Option<Pos2> {
        self.positions.get(&node).copied()
    }

    /// Current view transform
    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    /// Mutable view transform
    pub fn view_mut(&mut self) -> &mut ViewTransform {
        &mut self.view
    }

    /// Current interaction state
    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    /// Selected node
    pub fn selected(&self) -> Option<NodeHandle> {
        self.selected
    }

    /// Current hot port
    pub fn hot_port(&self) -> Option<HotPort> {
        self.hot_port
    }

    /// Node under the pointer
    pub fn hovered_node(&self) -> Option<NodeHandle> {
        self.hovered_node
    }

    /// Whether the physics has used up its tick budget
    pub fn is_settled(&self) -> bool {
        self.physics.is_settled()
    }

    /// Surface settings
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }
}

impl Default for GraphSurface {
    fn default() -> Self {
        Self::new(SurfaceConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CommandDescriptor;
    use crate::graph::InvalidTargetReason;

    fn catalog() -> CommandCatalog {
        CommandCatalog::from_descriptors(vec![
            CommandDescriptor {
                id: "say".to_string(),
                display_name: "Say".to_string(),
                parameters: vec!["text".to_string()],
                branches: vec!["Next".to_string()],
            },
            CommandDescriptor {
                id: "choice".to_string(),
                display_name: "Choice".to_string(),
                parameters: vec!["question".to_string()],
                branches: vec!["Yes".to_string(), "No".to_string()],
            },
        ])
    }

    struct Fixture {
        graph: EventGraph,
        catalog: CommandCatalog,
        surface: GraphSurface,
        a: NodeHandle,
        b: NodeHandle,
        c: NodeHandle,
    }

    /// Root at the origin, `a` and `b` (Say) and `c` (Choice) pinned far apart
    fn fixture() -> Fixture {
        let catalog = catalog();
        let mut graph = EventGraph::default();
        let a = graph.create_node(&catalog, "say").unwrap();
        let b = graph.create_node(&catalog, "say").unwrap();
        let c = graph.create_node(&catalog, "choice").unwrap();

        let mut surface = GraphSurface::default();
        surface.frame(&graph, &catalog, 0.016);
        surface.pin_node(NodeHandle::ROOT, Pos2::new(0.0, 0.0));
        surface.pin_node(a, Pos2::new(300.0, 0.0));
        surface.pin_node(b, Pos2::new(300.0, 200.0));
        surface.pin_node(c, Pos2::new(0.0, 300.0));
        surface.take_events();

        Fixture { graph, catalog, surface, a, b, c }
    }

    impl Fixture {
        fn port(&self, node: NodeHandle, branch: usize) -> Pos2 {
            self.surface.port_screen_pos(PortRef { node, branch }).unwrap()
        }

        fn center(&self, node: NodeHandle) -> Pos2 {
            self.surface.view().graph_to_screen(self.surface.position(node).unwrap())
        }

        fn send(&mut self, event: PointerEvent) {
            self.surface.handle_pointer(&mut self.graph, &self.catalog, event);
        }

        fn click(&mut self, pos: Pos2) {
            self.send(PointerEvent::Down { pos, button: PointerButton::Primary });
            self.send(PointerEvent::Up { pos });
        }
    }

    #[test]
    fn test_view_transform_round_trip() {
        let view = ViewTransform {
            pan: Vec2::new(40.0, -10.0),
            zoom: 2.0,
        };
        let p = Pos2::new(12.5, 7.0);
        assert_eq!(view.screen_to_graph(view.graph_to_screen(p)), p);
    }

    #[test]
    fn test_zoom_keeps_pointer_fixed_and_clamps() {
        let mut f = fixture();
        let pointer = Pos2::new(120.0, 80.0);
        let before = f.surface.view().screen_to_graph(pointer);

        f.send(PointerEvent::Scroll { pos: pointer, delta: 500.0 });
        let after = f.surface.view().screen_to_graph(pointer);
        assert!((f.surface.view().zoom - 1.5).abs() < 1e-5);
        assert!(before.distance(after) < 1e-3);

        for _ in 0..50 {
            f.send(PointerEvent::Scroll { pos: pointer, delta: 5000.0 });
        }
        assert_eq!(f.surface.view().zoom, f.surface.config().max_zoom);
    }

    #[test]
    fn test_hot_port_is_nearest_within_radius() {
        let f = fixture();
        let yes = f.port(f.c, 0);
        let no = f.port(f.c, 1);

        let near_no = no + Vec2::new(2.0, -1.0);
        let hot = f.surface.hot_port_at(near_no).unwrap();
        assert_eq!(hot.port, PortRef { node: f.c, branch: 1 });
        assert_eq!(hot.screen_pos, no);

        assert_eq!(f.surface.hot_port_at(yes).unwrap().port.branch, 0);
        assert!(f.surface.hot_port_at(yes + Vec2::new(20.0, 0.0)).is_none());
    }

    #[test]
    fn test_click_link_protocol() {
        let mut f = fixture();
        let root_port = f.port(NodeHandle::ROOT, 0);

        f.send(PointerEvent::Move { pos: root_port });
        assert!(f.surface.hot_port().is_some());
        f.click(root_port);
        assert!(matches!(f.surface.interaction(), Interaction::LinkPending(p) if p.source == NodeHandle::ROOT));

        // Rubber band follows the pointer without touching the model
        let mid = Pos2::new(150.0, 100.0);
        f.send(PointerEvent::Move { pos: mid });
        match f.surface.interaction() {
            Interaction::LinkPending(p) => {
                assert_eq!(p.pointer, mid);
                assert_eq!(p.anchor, root_port);
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert!(f.graph.derived_links().is_empty());

        let target = f.center(f.a);
        f.click(target);
        assert_eq!(f.surface.interaction(), &Interaction::Idle);
        assert_eq!(f.graph.target_of(NodeHandle::ROOT, 0), Some(f.a));
        assert!(f.surface.is_dirty());
        assert!(f.surface.take_events().contains(&SurfaceEvent::DocumentChanged));
    }

    #[test]
    fn test_pending_link_follows_moving_nodes() {
        let mut f = fixture();
        let start = f.port(f.a, 0);
        f.click(start);
        assert!(matches!(f.surface.interaction(), Interaction::LinkPending(_)));

        f.surface.pin_node(f.a, Pos2::new(-150.0, 50.0));
        f.surface.pin_node(f.b, Pos2::new(100.0, 400.0));
        f.surface.frame(&f.graph, &f.catalog, 0.016);

        let moved = f.port(f.a, 0);
        assert_ne!(moved, start);
        match f.surface.interaction() {
            Interaction::LinkPending(p) => assert_eq!(p.anchor, moved),
            other => panic!("unexpected state {other:?}"),
        }

        let target = f.center(f.b);
        assert_eq!(f.surface.node_at(target), Some(f.b));
        f.click(target);
        assert_eq!(f.surface.interaction(), &Interaction::Idle);
        assert_eq!(f.graph.target_of(f.a, 0), Some(f.b));
    }

    #[test]
    fn test_canvas_click_closes_picker() {
        let mut f = fixture();
        let at = Pos2::new(-200.0, 50.0);
        f.send(PointerEvent::Down { pos: at, button: PointerButton::Secondary });
        assert_eq!(f.surface.picker_at(), Some(at));

        f.click(Pos2::new(-500.0, -500.0));
        assert_eq!(f.surface.picker_at(), None);
    }

    #[test]
    fn test_remove_unselected_node_keeps_selection() {
        let mut f = fixture();
        f.surface.select(Some(f.a));
        let removed = f.surface.remove_node(&mut f.graph, f.b).unwrap();
        assert_eq!(removed.command_id, "say");
        assert_eq!(f.surface.selected(), Some(f.a));
        assert!(f.surface.is_dirty());
    }

    #[test]
    fn test_drag_release_completes_link() {
        let mut f = fixture();
        let port = f.port(f.a, 0);
        let target = f.center(f.b);

        f.send(PointerEvent::Down { pos: port, button: PointerButton::Primary });
        f.send(PointerEvent::Move { pos: target });
        f.send(PointerEvent::Up { pos: target });

        assert_eq!(f.surface.interaction(), &Interaction::Idle);
        assert_eq!(f.graph.target_of(f.a, 0), Some(f.b));
    }

    #[test]
    fn test_rejected_link_reports_error() {
        let mut f = fixture();
        f.graph.connect(&f.catalog, NodeHandle::ROOT, 0, f.a).unwrap();

        let port = f.port(f.b, 0);
        f.click(port);
        let target = f.center(f.a);
        f.click(target);

        assert_eq!(f.surface.interaction(), &Interaction::Idle);
        assert_eq!(f.graph.target_of(f.b, 0), None);
        let events = f.surface.take_events();
        assert!(events.contains(&SurfaceEvent::LinkRejected(GraphEditError::InvalidTarget {
            target: f.a,
            reason: InvalidTargetReason::AlreadyTargeted,
        })));
        assert!(!events.contains(&SurfaceEvent::DocumentChanged));
    }

    #[test]
    fn test_clicking_source_is_a_self_link() {
        let mut f = fixture();
        let port = f.port(f.a, 0);
        f.click(port);
        let own_body = f.center(f.a);
        f.click(own_body);

        assert_eq!(f.surface.interaction(), &Interaction::Idle);
        assert!(f.graph.derived_links().is_empty());
        assert!(f.surface.take_events().contains(&SurfaceEvent::LinkRejected(
            GraphEditError::InvalidTarget {
                target: f.a,
                reason: InvalidTargetReason::SelfLink,
            }
        )));
    }

    #[test]
    fn test_background_click_aborts_link() {
        let mut f = fixture();
        let port = f.port(f.a, 0);
        f.click(port);
        f.click(Pos2::new(-400.0, -400.0));

        assert_eq!(f.surface.interaction(), &Interaction::Idle);
        assert!(f.graph.derived_links().is_empty());
        assert!(f.surface.take_events().is_empty());
    }

    #[test]
    fn test_secondary_click() {
        let mut f = fixture();
        let at = Pos2::new(-200.0, 50.0);
        f.send(PointerEvent::Down { pos: at, button: PointerButton::Secondary });
        assert_eq!(f.surface.picker_at(), Some(at));
        assert_eq!(f.surface.take_events(), vec![SurfaceEvent::ContextMenuRequested(at)]);

        let port = f.port(f.a, 0);
        f.click(port);
        f.send(PointerEvent::Down { pos: at, button: PointerButton::Secondary });
        assert_eq!(f.surface.interaction(), &Interaction::Idle);
    }

    #[test]
    fn test_insert_command_spawns_under_pointer() {
        let mut f = fixture();
        let at = Pos2::new(-250.0, -150.0);
        let node = f
            .surface
            .insert_command(&mut f.graph, &f.catalog, "Choice", at)
            .unwrap();

        assert_eq!(f.graph.node(node).unwrap().command_id, "choice");
        assert_eq!(f.surface.selected(), Some(node));

        f.surface.frame(&f.graph, &f.catalog, 0.016);
        assert_eq!(f.surface.layout().nodes.len(), 5);
        assert!(f.surface.position(node).is_some());
        assert!(f.surface.take_events().contains(&SurfaceEvent::DocumentChanged));

        assert!(matches!(
            f.surface.insert_command(&mut f.graph, &f.catalog, "Nope", at),
            Err(GraphEditError::MissingCommand(_))
        ));
    }

    #[test]
    fn test_select_drag_and_delete() {
        let mut f = fixture();
        f.graph.connect(&f.catalog, NodeHandle::ROOT, 0, f.b).unwrap();
        let start = f.center(f.b);

        f.send(PointerEvent::Down { pos: start, button: PointerButton::Primary });
        assert_eq!(f.surface.selected(), Some(f.b));
        f.send(PointerEvent::Move { pos: start + Vec2::new(30.0, 10.0) });
        f.send(PointerEvent::Up { pos: start + Vec2::new(30.0, 10.0) });
        let moved = f.surface.position(f.b).unwrap();
        assert!((moved - Pos2::new(330.0, 210.0)).length() < 1e-3);

        let removed = f.surface.delete_selected(&mut f.graph).unwrap();
        assert_eq!(removed.unwrap().command_id, "say");
        assert!(!f.graph.contains(f.b));
        assert_eq!(f.graph.target_of(NodeHandle::ROOT, 0), None);
        assert_eq!(f.surface.selected(), None);

        let events = f.surface.take_events();
        assert!(events.contains(&SurfaceEvent::SelectionChanged(Some(f.b))));
        assert!(events.contains(&SurfaceEvent::SelectionChanged(None)));
        assert!(events.contains(&SurfaceEvent::DocumentChanged));
    }

    #[test]
    fn test_root_is_not_deleted() {
        let mut f = fixture();
        let root = f.center(NodeHandle::ROOT);
        f.click(root);
        assert_eq!(f.surface.selected(), Some(NodeHandle::ROOT));
        assert_eq!(f.surface.delete_selected(&mut f.graph).unwrap(), None);
        assert_eq!(f.graph.node_count(), 4);
    }

    #[test]
    fn test_background_drag_pans() {
        let mut f = fixture();
        let start = Pos2::new(-500.0, -500.0);
        f.send(PointerEvent::Down { pos: start, button: PointerButton::Primary });
        f.send(PointerEvent::Move { pos: start + Vec2::new(15.0, -5.0) });
        f.send(PointerEvent::Up { pos: start + Vec2::new(15.0, -5.0) });
        assert_eq!(f.surface.view().pan, Vec2::new(15.0, -5.0));
        assert_eq!(f.surface.interaction(), &Interaction::Idle);
    }

    #[test]
    fn test_reset_drops_layout() {
        let mut f = fixture();
        f.surface.select(Some(f.a));
        f.surface.reset();
        assert!(f.surface.layout().nodes.is_empty());
        assert!(f.surface.is_dirty());
        assert_eq!(f.surface.selected(), None);
    }
}
