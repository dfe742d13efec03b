// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node box measurement shared by the layout physics and the paint pass.
//!
//! Everything here is in graph space, centred on the node's layout position.
//! Both passes call [`measure_node`] so box sizes can never disagree.

use crate::catalog::CommandCatalog;
use crate::document::NodeInstance;
use crate::graph::NodeHandle;
use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Label drawn next to Root's single output port
pub const ROOT_BRANCH_LABEL: &str = "=>";

/// Text width provider
pub trait TextMeasure {
    /// Width of `text` in graph units
    fn text_width(&self, text: &str) -> f32;
}

/// Typography of node boxes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStyle {
    /// Font size in graph units
    pub font_size: f32,
    /// Line height as a multiple of the font size
    pub line_spacing: f32,
    /// Advance of one monospace glyph as a multiple of the font size
    pub glyph_advance: f32,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            font_size: 12.0,
            line_spacing: 1.2,
            glyph_advance: 0.6,
        }
    }
}

impl NodeStyle {
    /// Inner padding of a box
    pub fn padding(&self) -> f32 {
        self.font_size
    }

    /// Height of one text line
    pub fn line_height(&self) -> f32 {
        self.font_size * self.line_spacing
    }
}

impl TextMeasure for NodeStyle {
    fn text_width(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.font_size * self.glyph_advance
    }
}

/// Text content of a node box
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLabel {
    /// Title followed by one `name: value` line per parameter
    pub lines: Vec<String>,
    /// Branch labels, one per output port
    pub branches: Vec<String>,
    /// The node's command is not in the catalog
    pub missing: bool,
}

impl NodeLabel {
    /// Build the label for one node
    pub fn new(handle: NodeHandle, instance: &NodeInstance, catalog: &CommandCatalog) -> Self {
        if handle.is_root() {
            return Self {
                lines: vec!["Root".to_string()],
                branches: vec![ROOT_BRANCH_LABEL.to_string()],
                missing: false,
            };
        }

        match catalog.get(&instance.command_id) {
            Some(command) => {
                let mut lines = Vec::with_capacity(command.parameters.len() + 1);
                lines.push(command.display_name.clone());
                for (index, name) in command.parameters.iter().enumerate() {
                    let value = instance.bound_params.get(index).map_or("", String::as_str);
                    lines.push(format!("{name}: {value}"));
                }
                Self {
                    lines,
                    branches: command.branches.clone(),
                    missing: false,
                }
            }
            None => Self {
                lines: vec![instance.command_id.clone()],
                branches: Vec::new(),
                missing: true,
            },
        }
    }
}

/// Size and port placement of one node box
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMetrics {
    /// Box size
    pub size: Vec2,
    /// Inner padding
    pub padding: f32,
    /// Text line height
    pub line_height: f32,
    /// Output port anchors, offset from the box centre, in branch order
    pub output_ports: Vec<Vec2>,
    /// Input anchor, offset from the box centre
    pub input_port: Vec2,
}

impl NodeMetrics {
    /// Box rectangle for a node centred at `center`
    pub fn rect(&self, center: Pos2) -> Rect {
        Rect::from_center_size(center, self.size)
    }

    /// Output port position for a node centred at `center`
    pub fn output_port(&self, center: Pos2, branch: usize) -> Option<Pos2> {
        self.output_ports.get(branch).map(|offset| center + *offset)
    }

    /// Input anchor position for a node centred at `center`
    pub fn input_port(&self, center: Pos2) -> Pos2 {
        center + self.input_port
    }

    /// Radius of a drawn port circle
    pub fn port_radius(&self) -> f32 {
        self.padding / 2.0
    }

    /// Box area, used to weight repulsion in the layout
    pub fn area(&self) -> f32 {
        self.size.x * self.size.y
    }
}

/// Measure a label.
///
/// Output port `i` of `n` sits on the right edge at `height * (i + 1) / (n + 1)`
/// from the top; the input anchor sits on the left edge, vertically centred.
pub fn measure_label(label: &NodeLabel, style: &NodeStyle) -> NodeMetrics {
    let padding = style.padding();
    let line_height = style.line_height();

    let text_width = label
        .lines
        .iter()
        .map(|line| style.text_width(line))
        .fold(0.0_f32, f32::max);
    let branch_width = if label.branches.is_empty() {
        0.0
    } else {
        label
            .branches
            .iter()
            .map(|branch| style.text_width(branch))
            .fold(0.0_f32, f32::max)
            + padding * 2.0
    };

    let rows = label.lines.len().max(label.branches.len()).max(1);
    let size = Vec2::new(
        text_width + padding * 2.0 + branch_width,
        rows as f32 * line_height + padding * 2.0,
    );

    let slots = label.branches.len() + 1;
    let output_ports = (0..label.branches.len())
        .map(|i| {
            let y = size.y * (i + 1) as f32 / slots as f32;
            Vec2::new(size.x / 2.0, y - size.y / 2.0)
        })
        .collect();

    NodeMetrics {
        size,
        padding,
        line_height,
        output_ports,
        input_port: Vec2::new(-size.x / 2.0, 0.0),
    }
}

/// Label and measure one node of a graph
pub fn measure_node(
    handle: NodeHandle,
    instance: &NodeInstance,
    catalog: &CommandCatalog,
    style: &NodeStyle,
) -> (NodeLabel, NodeMetrics) {
    let label = NodeLabel::new(handle, instance, catalog);
    let metrics = measure_label(&label, style);
    (label, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CommandDescriptor;

    fn catalog() -> CommandCatalog {
        CommandCatalog::from_descriptors(vec![CommandDescriptor {
            id: "choice".to_string(),
            display_name: "Choice".to_string(),
            parameters: vec!["question".to_string()],
            branches: vec!["Yes".to_string(), "No".to_string(), "Later".to_string()],
        }])
    }

    #[test]
    fn test_root_label() {
        let label = NodeLabel::new(NodeHandle::ROOT, &NodeInstance::root(), &catalog());
        assert_eq!(label.lines, vec!["Root"]);
        assert_eq!(label.branches, vec![ROOT_BRANCH_LABEL]);
    }

    #[test]
    fn test_command_label() {
        let instance = NodeInstance {
            command_id: "choice".to_string(),
            bound_params: vec!["Continue?".to_string()],
        };
        let label = NodeLabel::new(NodeHandle(1), &instance, &catalog());
        assert_eq!(label.lines, vec!["Choice", "question: Continue?"]);
        assert_eq!(label.branches.len(), 3);
        assert!(!label.missing);
    }

    #[test]
    fn test_missing_command_label() {
        let instance = NodeInstance::new("gone", 2);
        let label = NodeLabel::new(NodeHandle(1), &instance, &catalog());
        assert_eq!(label.lines, vec!["gone"]);
        assert!(label.branches.is_empty());
        assert!(label.missing);

        let metrics = measure_label(&label, &NodeStyle::default());
        assert!(metrics.output_ports.is_empty());
        assert!(metrics.size.x > 0.0 && metrics.size.y > 0.0);
    }

    #[test]
    fn test_port_slots() {
        let style = NodeStyle::default();
        let instance = NodeInstance::new("choice", 1);
        let (_, metrics) = measure_node(NodeHandle(1), &instance, &catalog(), &style);

        // Three branches outnumber the two text lines
        let expected_height = 3.0 * style.line_height() + 2.0 * style.padding();
        assert!((metrics.size.y - expected_height).abs() < 1e-4);

        let center = Pos2::new(100.0, 50.0);
        let rect = metrics.rect(center);
        for branch in 0..3 {
            let port = metrics.output_port(center, branch).unwrap();
            assert!((port.x - rect.right()).abs() < 1e-4);
            let expected = rect.top() + rect.height() * (branch + 1) as f32 / 4.0;
            assert!((port.y - expected).abs() < 1e-4);
        }
        assert!(metrics.output_port(center, 3).is_none());
        assert_eq!(metrics.input_port(center), Pos2::new(rect.left(), center.y));
    }

    #[test]
    fn test_longer_text_widens_box() {
        let style = NodeStyle::default();
        let short = NodeInstance::new("choice", 1);
        let long = NodeInstance {
            command_id: "choice".to_string(),
            bound_params: vec!["a much longer question than before".to_string()],
        };
        let (_, a) = measure_node(NodeHandle(1), &short, &catalog(), &style);
        let (_, b) = measure_node(NodeHandle(1), &long, &catalog(), &style);
        assert!(b.size.x > a.size.x);
        assert!(b.area() > a.area());
    }
}
