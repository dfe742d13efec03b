// SPDX-License-Identifier: MIT OR Apache-2.0
//! Derived render graph and force-directed auto-layout.
//!
//! [`recompute`] turns the model into a [`GraphLayout`] (labels, box metrics,
//! links). [`ForceLayout`] owns node positions and runs a bounded number of
//! physics ticks every time the layout is re-synced.

use crate::catalog::CommandCatalog;
use crate::geometry::{measure_node, NodeLabel, NodeMetrics, NodeStyle};
use crate::graph::{EventGraph, Link, NodeHandle};
use egui::Pos2;
use force_graph::{DefaultNodeIdx, EdgeData, ForceGraph, NodeData, SimulationParameters};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::f32::consts::TAU;

/// One node ready to be laid out and painted
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    /// Model handle
    pub handle: NodeHandle,
    /// Box text
    pub label: NodeLabel,
    /// Box geometry
    pub metrics: NodeMetrics,
}

/// Renderable snapshot of the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphLayout {
    /// Nodes in model order
    pub nodes: Vec<LayoutNode>,
    /// Links in model order, then branch order
    pub links: Vec<Link>,
}

impl GraphLayout {
    /// Look up a node by handle
    pub fn node(&self, handle: NodeHandle) -> Option<&LayoutNode> {
        self.nodes.iter().find(|node| node.handle == handle)
    }
}

/// Derive the renderable graph from the model and catalog
pub fn recompute(graph: &EventGraph, catalog: &CommandCatalog, style: &NodeStyle) -> GraphLayout {
    let nodes = graph
        .nodes()
        .map(|(handle, instance)| {
            let (label, metrics) = measure_node(handle, instance, catalog, style);
            LayoutNode { handle, label, metrics }
        })
        .collect();

    GraphLayout {
        nodes,
        links: graph.derived_links(),
    }
}

/// Physics settings for the auto-layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Repulsion strength between every pair of nodes
    pub force_charge: f32,
    /// Spring strength along links
    pub force_spring: f32,
    /// Per-tick force clamp
    pub force_max: f32,
    /// Velocity scale
    pub node_speed: f32,
    /// Velocity damping per tick
    pub damping_factor: f32,
    /// Ticks run after each change before the layout settles
    pub cooldown_ticks: u32,
    /// Mass per unit of box area; bigger boxes push harder
    pub mass_per_area: f32,
    /// Lower bound on node mass
    pub min_mass: f32,
    /// Radius of the ring new nodes are seeded on
    pub spawn_radius: f32,
    /// Vertical distance between depth levels below Root; `None` lays out freely
    pub dag_level_distance: Option<f32>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            force_charge: 150.0,
            force_spring: 0.05,
            force_max: 100.0,
            node_speed: 3000.0,
            damping_factor: 0.9,
            cooldown_ticks: 100,
            mass_per_area: 1.0 / 150.0,
            min_mass: 10.0,
            spawn_radius: 120.0,
            dag_level_distance: Some(100.0),
        }
    }
}

impl LayoutConfig {
    fn simulation(&self) -> SimulationParameters {
        SimulationParameters {
            force_charge: self.force_charge,
            force_spring: self.force_spring,
            force_max: self.force_max,
            node_speed: self.node_speed,
            damping_factor: self.damping_factor,
        }
    }

    fn mass(&self, metrics: &NodeMetrics) -> f32 {
        (metrics.area() * self.mass_per_area).max(self.min_mass)
    }
}

/// Force-directed positions for the nodes of a [`GraphLayout`]
pub struct ForceLayout {
    graph: ForceGraph<NodeHandle, ()>,
    config: LayoutConfig,
    levels: HashMap<NodeHandle, usize>,
    remaining_ticks: u32,
}

impl ForceLayout {
    /// Create an empty layout
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            graph: ForceGraph::new(config.simulation()),
            config,
            levels: HashMap::new(),
            remaining_ticks: 0,
        }
    }

    /// Rebuild the physics graph for a new shape and restart the tick budget.
    ///
    /// Nodes already placed keep their position and anchoring. A node listed
    /// in `spawn` starts there; other new nodes are seeded on a ring around
    /// the current centroid.
    pub fn sync(&mut self, layout: &GraphLayout, spawn: Option<(NodeHandle, Pos2)>) {
        let mut previous: HashMap<NodeHandle, (Pos2, bool)> = HashMap::new();
        self.graph.visit_nodes(|node| {
            previous.insert(
                node.data.user_data,
                (Pos2::new(node.x(), node.y()), node.data.is_anchor),
            );
        });

        let centroid = if previous.is_empty() {
            Pos2::ZERO
        } else {
            let sum = previous
                .values()
                .fold(egui::Vec2::ZERO, |acc, (pos, _)| acc + pos.to_vec2());
            (sum / previous.len() as f32).to_pos2()
        };
        let fresh: Vec<NodeHandle> = layout
            .nodes
            .iter()
            .map(|node| node.handle)
            .filter(|handle| !previous.contains_key(handle))
            .collect();

        self.graph = ForceGraph::new(self.config.simulation());
        let mut indices: HashMap<NodeHandle, DefaultNodeIdx> = HashMap::new();
        for node in &layout.nodes {
            let (pos, is_anchor) = match previous.get(&node.handle) {
                Some(known) => *known,
                None => match spawn {
                    Some((handle, at)) if handle == node.handle => (at, false),
                    _ => {
                        let slot = fresh.iter().position(|h| *h == node.handle).unwrap_or(0);
                        (ring_position(centroid, slot, fresh.len(), self.config.spawn_radius), false)
                    }
                },
            };

            let idx = self.graph.add_node(NodeData {
                x: pos.x,
                y: pos.y,
                mass: self.config.mass(&node.metrics),
                is_anchor,
                user_data: node.handle,
            });
            indices.insert(node.handle, idx);
        }

        for link in &layout.links {
            if let (Some(&src), Some(&tgt)) = (indices.get(&link.source), indices.get(&link.target)) {
                self.graph.add_edge(src, tgt, EdgeData::default());
            }
        }

        self.levels = depth_levels(layout);
        self.restart();
        tracing::debug!(
            "Layout synced: {} nodes, {} links, {} new",
            layout.nodes.len(),
            layout.links.len(),
            fresh.len()
        );
    }

    /// Restart the tick budget without changing the shape
    pub fn restart(&mut self) {
        self.remaining_ticks = self.config.cooldown_ticks;
    }

    /// Advance the simulation by one tick if the budget allows.
    ///
    /// Returns whether a tick ran.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.remaining_ticks == 0 {
            return false;
        }
        self.graph.update(dt);
        self.apply_levels();
        self.remaining_ticks -= 1;
        true
    }

    /// Snap free nodes onto their depth row below Root
    fn apply_levels(&mut self) {
        let Some(distance) = self.config.dag_level_distance else {
            return;
        };
        let origin = self.position(NodeHandle::ROOT).map_or(0.0, |root| root.y);
        let levels = &self.levels;
        self.graph.visit_nodes_mut(|node| {
            if node.data.is_anchor {
                return;
            }
            if let Some(level) = levels.get(&node.data.user_data) {
                node.data.y = origin + *level as f32 * distance;
            }
        });
    }

    /// Depth level of a node in the top-down layout
    pub fn level(&self, handle: NodeHandle) -> Option<usize> {
        self.levels.get(&handle).copied()
    }

    /// Whether the tick budget is spent
    pub fn is_settled(&self) -> bool {
        self.remaining_ticks == 0
    }

    /// Current position of every node
    pub fn positions(&self) -> HashMap<NodeHandle, Pos2> {
        let mut positions = HashMap::new();
        self.graph.visit_nodes(|node| {
            positions.insert(node.data.user_data, Pos2::new(node.x(), node.y()));
        });
        positions
    }

    /// Current position of one node
    pub fn position(&self, handle: NodeHandle) -> Option<Pos2> {
        let mut found = None;
        self.graph.visit_nodes(|node| {
            if node.data.user_data == handle {
                found = Some(Pos2::new(node.x(), node.y()));
            }
        });
        found
    }

    /// Move a node, optionally pinning it so the physics leaves it in place
    pub fn set_position(&mut self, handle: NodeHandle, pos: Pos2, anchor: bool) {
        self.graph.visit_nodes_mut(|node| {
            if node.data.user_data == handle {
                node.data.x = pos.x;
                node.data.y = pos.y;
                node.data.is_anchor = anchor;
            }
        });
    }

    /// Number of nodes in the simulation
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.graph.visit_nodes(|_| count += 1);
        count
    }
}

impl Default for ForceLayout {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

/// Breadth-first depth from Root over the links. Nodes Root cannot reach
/// share the level after the deepest reachable one.
fn depth_levels(layout: &GraphLayout) -> HashMap<NodeHandle, usize> {
    let mut children: HashMap<NodeHandle, Vec<NodeHandle>> = HashMap::new();
    for link in &layout.links {
        children.entry(link.source).or_default().push(link.target);
    }

    let mut levels = HashMap::new();
    let mut queue = VecDeque::new();
    if layout.node(NodeHandle::ROOT).is_some() {
        levels.insert(NodeHandle::ROOT, 0);
        queue.push_back(NodeHandle::ROOT);
    }
    while let Some(node) = queue.pop_front() {
        let next = levels.get(&node).map_or(1, |level| level + 1);
        for child in children.get(&node).into_iter().flatten() {
            if !levels.contains_key(child) {
                levels.insert(*child, next);
                queue.push_back(*child);
            }
        }
    }

    let trailing = levels.values().max().map_or(0, |deepest| deepest + 1);
    for node in &layout.nodes {
        levels.entry(node.handle).or_insert(trailing);
    }
    levels
}

fn ring_position(center: Pos2, slot: usize, count: usize, radius: f32) -> Pos2 {
    if count <= 1 && center == Pos2::ZERO {
        return center;
    }
    let angle = slot as f32 * TAU / count.max(1) as f32;
    Pos2::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CommandDescriptor;

    fn catalog() -> CommandCatalog {
        CommandCatalog::from_descriptors(vec![CommandDescriptor {
            id: "say".to_string(),
            display_name: "Say".to_string(),
            parameters: vec!["text".to_string()],
            branches: vec!["Next".to_string()],
        }])
    }

    fn chain(len: usize) -> (EventGraph, CommandCatalog) {
        let catalog = catalog();
        let mut graph = EventGraph::default();
        let mut prev = NodeHandle::ROOT;
        for _ in 0..len {
            let next = graph.create_node(&catalog, "say").unwrap();
            graph.connect(&catalog, prev, 0, next).unwrap();
            prev = next;
        }
        (graph, catalog)
    }

    #[test]
    fn test_recompute_mirrors_model() {
        let (graph, catalog) = chain(2);
        let layout = recompute(&graph, &catalog, &NodeStyle::default());
        assert_eq!(layout.nodes.len(), 3);
        assert_eq!(layout.links, graph.derived_links());
        assert_eq!(layout.node(NodeHandle(2)).unwrap().label.lines[0], "Say");
        assert_eq!(layout, recompute(&graph, &catalog, &NodeStyle::default()));
    }

    #[test]
    fn test_tick_budget() {
        let (graph, catalog) = chain(2);
        let layout = recompute(&graph, &catalog, &NodeStyle::default());
        let config = LayoutConfig { cooldown_ticks: 3, ..LayoutConfig::default() };
        let mut physics = ForceLayout::new(config);
        assert!(physics.is_settled());

        physics.sync(&layout, None);
        assert!(!physics.is_settled());
        assert!(physics.tick(0.016));
        assert!(physics.tick(0.016));
        assert!(physics.tick(0.016));
        assert!(!physics.tick(0.016));
        assert!(physics.is_settled());
    }

    #[test]
    fn test_sync_keeps_existing_positions() {
        let (mut graph, catalog) = chain(1);
        let style = NodeStyle::default();
        let mut physics = ForceLayout::default();
        physics.sync(&recompute(&graph, &catalog, &style), None);
        physics.set_position(NodeHandle(1), Pos2::new(40.0, -25.0), true);

        let added = graph.create_node(&catalog, "say").unwrap();
        let spawn = Pos2::new(300.0, 10.0);
        physics.sync(&recompute(&graph, &catalog, &style), Some((added, spawn)));

        assert_eq!(physics.node_count(), 3);
        assert_eq!(physics.position(NodeHandle(1)), Some(Pos2::new(40.0, -25.0)));
        assert_eq!(physics.position(added), Some(spawn));
    }

    #[test]
    fn test_anchored_node_stays_put() {
        let (graph, catalog) = chain(3);
        let mut physics = ForceLayout::default();
        physics.sync(&recompute(&graph, &catalog, &NodeStyle::default()), None);
        physics.set_position(NodeHandle::ROOT, Pos2::new(5.0, 5.0), true);
        while physics.tick(0.016) {}
        assert_eq!(physics.position(NodeHandle::ROOT), Some(Pos2::new(5.0, 5.0)));
        assert_eq!(physics.positions().len(), 4);
    }

    #[test]
    fn test_chain_settles_top_down() {
        let (graph, catalog) = chain(3);
        let mut physics = ForceLayout::default();
        physics.sync(&recompute(&graph, &catalog, &NodeStyle::default()), None);
        while physics.tick(0.016) {}

        let ys: Vec<f32> = (0..4)
            .map(|i| physics.position(NodeHandle(i)).unwrap().y)
            .collect();
        for pair in ys.windows(2) {
            assert!((pair[1] - pair[0] - 100.0).abs() < 1e-3, "levels {ys:?}");
        }
    }

    #[test]
    fn test_unreachable_nodes_take_trailing_level() {
        let (mut graph, catalog) = chain(2);
        let orphan = graph.create_node(&catalog, "say").unwrap();
        let layout = recompute(&graph, &catalog, &NodeStyle::default());
        let mut physics = ForceLayout::default();
        physics.sync(&layout, None);

        assert_eq!(physics.level(NodeHandle::ROOT), Some(0));
        assert_eq!(physics.level(NodeHandle(2)), Some(2));
        assert_eq!(physics.level(orphan), Some(3));
    }

    #[test]
    fn test_free_layout_without_levels() {
        let (graph, catalog) = chain(1);
        let config = LayoutConfig { dag_level_distance: None, ..LayoutConfig::default() };
        let mut physics = ForceLayout::new(config);
        physics.sync(&recompute(&graph, &catalog, &NodeStyle::default()), None);
        physics.set_position(NodeHandle(1), Pos2::new(0.0, -40.0), false);
        physics.tick(0.0);
        assert!(physics.position(NodeHandle(1)).unwrap().y < 0.0);
    }

    #[test]
    fn test_new_nodes_do_not_stack() {
        let (graph, catalog) = chain(4);
        let mut physics = ForceLayout::default();
        physics.sync(&recompute(&graph, &catalog, &NodeStyle::default()), None);
        let positions = physics.positions();
        let mut seen: Vec<Pos2> = Vec::new();
        for pos in positions.values() {
            assert!(seen.iter().all(|p| p.distance(*pos) > 1.0));
            seen.push(*pos);
        }
    }
}
