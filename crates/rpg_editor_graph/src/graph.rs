// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event graph model: node arena plus per-branch adjacency.
//!
//! Nodes are addressed by [`NodeHandle`]s that are allocated monotonically and
//! never reused, so removing a node does not disturb any other edge. Handles
//! only become positions again when the graph is written back to an
//! [`EventDocument`].

use crate::catalog::{CommandCatalog, CommandDescriptor};
use crate::document::{AdjacencyRow, EventDocument, NodeInstance, ROOT_COMMAND_ID};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a node inside one [`EventGraph`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeHandle(pub u32);

impl NodeHandle {
    /// The Root pseudo-node, present in every graph
    pub const ROOT: Self = Self(0);

    /// Whether this is the Root pseudo-node
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directed edge out of one branch slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    /// Source node
    pub source: NodeHandle,
    /// Branch slot on the source
    pub branch: usize,
    /// Target node
    pub target: NodeHandle,
}

/// Why a link target was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTargetReason {
    /// Root never has an incoming edge
    #[error("Root cannot be a link target")]
    TargetIsRoot,

    /// Source and target are the same node
    #[error("a node cannot link to itself")]
    SelfLink,

    /// The target already has an incoming edge
    #[error("node already has an incoming link")]
    AlreadyTargeted,
}

/// Error from a structural edit
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphEditError {
    /// Link target refused
    #[error("Invalid link target {target}: {reason}")]
    InvalidTarget {
        /// Refused target
        target: NodeHandle,
        /// Reason
        reason: InvalidTargetReason,
    },

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeHandle),

    /// Branch index past the node's branch count
    #[error("Branch {branch} out of range for node {node} ({count} branches)")]
    BranchOutOfRange {
        /// Source node
        node: NodeHandle,
        /// Requested branch
        branch: usize,
        /// Branch count of the node's command
        count: usize,
    },

    /// Parameter index past the node's parameter count
    #[error("Parameter {index} out of range for node {node} ({count} parameters)")]
    ParamOutOfRange {
        /// Node
        node: NodeHandle,
        /// Requested parameter
        index: usize,
        /// Parameter count of the node's command
        count: usize,
    },

    /// Command id not in the loaded catalog
    #[error("Command not in catalog: {0}")]
    MissingCommand(String),

    /// Root is permanent
    #[error("Root cannot be removed")]
    CannotRemoveRoot,
}

/// Result type for graph edits
pub type Result<T> = std::result::Result<T, GraphEditError>;

/// Editable event graph
#[derive(Debug, Clone)]
pub struct EventGraph {
    /// Event id (metadata, untouched by edits)
    pub id: String,
    /// Event name (metadata, untouched by edits)
    pub name: String,
    /// Trigger condition (metadata, untouched by edits)
    pub appear: String,
    nodes: IndexMap<NodeHandle, NodeInstance>,
    adjacency: IndexMap<NodeHandle, Vec<Option<NodeHandle>>>,
    next_handle: u32,
}

impl Default for EventGraph {
    fn default() -> Self {
        Self::from_document(&EventDocument::default())
    }
}

impl EventGraph {
    /// Build the model from a stored document.
    ///
    /// Position `i` becomes handle `i`. Rows pointing outside `orders` are
    /// dropped and duplicate rows for one source keep the first. Orphaned or
    /// unreachable nodes are accepted as they are.
    pub fn from_document(doc: &EventDocument) -> Self {
        let mut nodes = IndexMap::with_capacity(doc.orders.len().max(1));
        for (index, instance) in doc.orders.iter().enumerate() {
            nodes.insert(NodeHandle(index as u32), instance.clone());
        }

        if nodes.is_empty() {
            nodes.insert(NodeHandle::ROOT, NodeInstance::root());
        } else if let Some(first) = nodes.get_mut(&NodeHandle::ROOT) {
            if first.command_id != ROOT_COMMAND_ID {
                tracing::warn!(
                    "Event {:?}: position 0 holds {:?}, treating it as Root",
                    doc.id,
                    first.command_id
                );
                *first = NodeInstance::root();
            }
        }

        let len = nodes.len();
        let mut adjacency = IndexMap::new();
        for row in &doc.adjacency {
            if row.from >= len {
                tracing::warn!("Event {:?}: dropping adjacency row from missing node {}", doc.id, row.from);
                continue;
            }
            let from = NodeHandle(row.from as u32);
            if adjacency.contains_key(&from) {
                tracing::warn!("Event {:?}: dropping duplicate adjacency row for node {}", doc.id, row.from);
                continue;
            }
            let slots = row
                .to
                .iter()
                .map(|slot| match *slot {
                    Some(target) if target < len => Some(NodeHandle(target as u32)),
                    Some(target) => {
                        tracing::warn!("Event {:?}: clearing link {} -> missing node {}", doc.id, row.from, target);
                        None
                    }
                    None => None,
                })
                .collect();
            adjacency.insert(from, slots);
        }

        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            appear: doc.appear.clone(),
            nodes,
            adjacency,
            next_handle: len as u32,
        }
    }

    /// Write the model back as a document, compacting handles to positions
    pub fn to_document(&self) -> EventDocument {
        let positions: HashMap<NodeHandle, usize> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(position, handle)| (*handle, position))
            .collect();

        let adjacency = self
            .adjacency
            .iter()
            .filter_map(|(from, slots)| {
                let from = *positions.get(from)?;
                let to = slots
                    .iter()
                    .map(|slot| slot.and_then(|target| positions.get(&target).copied()))
                    .collect();
                Some(AdjacencyRow { from, to })
            })
            .collect();

        EventDocument {
            id: self.id.clone(),
            name: self.name.clone(),
            appear: self.appear.clone(),
            orders: self.nodes.values().cloned().collect(),
            adjacency,
        }
    }

    /// Append a node for `command_id` with empty parameter values
    pub fn create_node(&mut self, catalog: &CommandCatalog, command_id: &str) -> Result<NodeHandle> {
        let command = catalog
            .get(command_id)
            .ok_or_else(|| GraphEditError::MissingCommand(command_id.to_string()))?;

        let handle = NodeHandle(self.next_handle);
        self.next_handle += 1;
        self.nodes
            .insert(handle, NodeInstance::new(&command.id, command.parameters.len()));
        tracing::debug!("Created node {handle} ({command_id})");
        Ok(handle)
    }

    /// Replace one bound parameter value
    pub fn bind_param(
        &mut self,
        catalog: &CommandCatalog,
        node: NodeHandle,
        index: usize,
        value: impl Into<String>,
    ) -> Result<()> {
        let count = self.param_names(catalog, node)?.len();
        if index >= count {
            return Err(GraphEditError::ParamOutOfRange { node, index, count });
        }

        let instance = self
            .nodes
            .get_mut(&node)
            .ok_or(GraphEditError::NodeNotFound(node))?;
        if instance.bound_params.len() < count {
            instance.bound_params.resize(count, String::new());
        }
        instance.bound_params[index] = value.into();
        Ok(())
    }

    /// Point branch `branch` of `from` at `to`.
    ///
    /// Any previous target of that slot is unlinked but kept in the graph.
    /// Re-linking a slot to its current target succeeds without change.
    pub fn connect(
        &mut self,
        catalog: &CommandCatalog,
        from: NodeHandle,
        branch: usize,
        to: NodeHandle,
    ) -> Result<()> {
        let count = self.branch_count(catalog, from)?;
        if !self.nodes.contains_key(&to) {
            return Err(GraphEditError::NodeNotFound(to));
        }

        let invalid = |reason| GraphEditError::InvalidTarget { target: to, reason };
        if to.is_root() {
            return Err(invalid(InvalidTargetReason::TargetIsRoot));
        }
        if from == to {
            return Err(invalid(InvalidTargetReason::SelfLink));
        }
        if branch >= count {
            return Err(GraphEditError::BranchOutOfRange { node: from, branch, count });
        }
        if self.target_of(from, branch) == Some(to) {
            return Ok(());
        }
        if self.incoming(to).is_some() {
            return Err(invalid(InvalidTargetReason::AlreadyTargeted));
        }

        let slots = self.adjacency.entry(from).or_insert_with(|| vec![None; count]);
        if slots.len() < count {
            slots.resize(count, None);
        }
        if let Some(previous) = slots[branch].replace(to) {
            tracing::debug!("Unlinked {previous} from {from}[{branch}]");
        }
        tracing::debug!("Linked {from}[{branch}] -> {to}");
        Ok(())
    }

    /// Clear one branch slot, returning the target it held
    pub fn disconnect(&mut self, from: NodeHandle, branch: usize) -> Result<Option<NodeHandle>> {
        if !self.nodes.contains_key(&from) {
            return Err(GraphEditError::NodeNotFound(from));
        }
        Ok(self
            .adjacency
            .get_mut(&from)
            .and_then(|slots| slots.get_mut(branch))
            .and_then(Option::take))
    }

    /// Remove a non-Root node along with its row and every edge into it
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<NodeInstance> {
        if node.is_root() {
            return Err(GraphEditError::CannotRemoveRoot);
        }
        let instance = self
            .nodes
            .shift_remove(&node)
            .ok_or(GraphEditError::NodeNotFound(node))?;

        self.adjacency.shift_remove(&node);
        for slots in self.adjacency.values_mut() {
            for slot in slots.iter_mut().filter(|slot| **slot == Some(node)) {
                *slot = None;
            }
        }
        tracing::debug!("Removed node {node} ({})", instance.command_id);
        Ok(instance)
    }

    /// Every connected slot, in node order then branch order
    pub fn derived_links(&self) -> Vec<Link> {
        let mut links = Vec::new();
        for source in self.nodes.keys() {
            let Some(slots) = self.adjacency.get(source) else {
                continue;
            };
            for (branch, slot) in slots.iter().enumerate() {
                if let Some(target) = *slot {
                    links.push(Link { source: *source, branch, target });
                }
            }
        }
        links
    }

    /// Get a node by handle
    pub fn node(&self, node: NodeHandle) -> Option<&NodeInstance> {
        self.nodes.get(&node)
    }

    /// All nodes in order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &NodeInstance)> {
        self.nodes.iter().map(|(handle, instance)| (*handle, instance))
    }

    /// All node handles in order
    pub fn node_handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of nodes, Root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether a node exists
    pub fn contains(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Branch slots of a source node, if it has a row
    pub fn row(&self, from: NodeHandle) -> Option<&[Option<NodeHandle>]> {
        self.adjacency.get(&from).map(Vec::as_slice)
    }

    /// Current target of one slot
    pub fn target_of(&self, from: NodeHandle, branch: usize) -> Option<NodeHandle> {
        self.adjacency.get(&from)?.get(branch).copied().flatten()
    }

    /// The slot that currently links into `node`, if any
    pub fn incoming(&self, node: NodeHandle) -> Option<(NodeHandle, usize)> {
        self.adjacency.iter().find_map(|(from, slots)| {
            slots
                .iter()
                .position(|slot| *slot == Some(node))
                .map(|branch| (*from, branch))
        })
    }

    /// Number of output branches of a node (Root: 1, unknown command: 0)
    pub fn branch_count(&self, catalog: &CommandCatalog, node: NodeHandle) -> Result<usize> {
        let instance = self.node(node).ok_or(GraphEditError::NodeNotFound(node))?;
        if node.is_root() {
            return Ok(1);
        }
        Ok(catalog
            .get(&instance.command_id)
            .map_or(0, |command| command.branch_count()))
    }

    /// Catalog descriptor of a node's command, `None` for Root
    pub fn command_of<'c>(
        &self,
        catalog: &'c CommandCatalog,
        node: NodeHandle,
    ) -> Result<Option<&'c CommandDescriptor>> {
        let instance = self.node(node).ok_or(GraphEditError::NodeNotFound(node))?;
        if node.is_root() {
            return Ok(None);
        }
        catalog
            .get(&instance.command_id)
            .map(Some)
            .ok_or_else(|| GraphEditError::MissingCommand(instance.command_id.clone()))
    }

    /// Parameter names of a node's command (empty for Root and unknown commands)
    pub fn param_names<'c>(&self, catalog: &'c CommandCatalog, node: NodeHandle) -> Result<&'c [String]> {
        let instance = self.node(node).ok_or(GraphEditError::NodeNotFound(node))?;
        if node.is_root() {
            return Ok(&[]);
        }
        Ok(catalog
            .get(&instance.command_id)
            .map_or(&[] as &[String], |command| command.parameters.as_slice()))
    }
}
