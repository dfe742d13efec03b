// SPDX-License-Identifier: MIT OR Apache-2.0
//! egui front end for [`GraphSurface`].
//!
//! Translates egui pointer and keyboard input into [`PointerEvent`]s and
//! paints the current layout:
//! - Background grid
//! - Links with arrowheads
//! - Node boxes with parameter lines and branch labels
//! - Output ports, hot port highlighted
//! - Rubber band while linking
//! - Command picker
//! - Status bar

use crate::catalog::CommandCatalog;
use crate::geometry::NodeMetrics;
use crate::graph::EventGraph;
use crate::layout::LayoutNode;
use crate::surface::{GraphSurface, Interaction, PointerButton, PointerEvent};
use egui::{Color32, Pos2, Rect, Stroke, Vec2};

/// Grid parameters
const GRID_SPACING: f32 = 20.0;

/// Node visuals
const NODE_ROUNDING: f32 = 4.0;
const ARROW_SIZE: f32 = 8.0;
const LINK_THICKNESS: f32 = 1.5;

const HOT_PORT_COLOR: Color32 = Color32::from_rgb(0x90, 0xEE, 0x90);
const PORT_COLOR: Color32 = Color32::from_rgb(0xD3, 0xD3, 0xD3);
const LINK_COLOR: Color32 = Color32::from_rgb(170, 170, 180);
const SELECTION_COLOR: Color32 = Color32::from_rgb(100, 150, 255);
const MISSING_COLOR: Color32 = Color32::from_rgb(200, 80, 80);

impl GraphSurface {
    /// Run one frame of the surface inside `ui`, filling the available space
    pub fn show(&mut self, ui: &mut egui::Ui, graph: &mut EventGraph, catalog: &CommandCatalog) -> egui::Response {
        let rect = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        self.init_viewport(rect.size());
        let dt = ui.input(|i| i.stable_dt).min(0.1);
        self.frame(graph, catalog, dt);

        self.handle_input(ui, &response, rect, graph, catalog);

        self.draw_grid(&painter, rect);
        self.draw_links(&painter, rect);
        self.draw_nodes(&painter, rect);
        self.draw_rubber_band(&painter, rect);
        self.draw_status_bar(&painter, rect, graph);
        self.show_picker(ui.ctx(), rect, graph, catalog);

        if !self.is_settled() {
            ui.ctx().request_repaint();
        }
        response
    }

    fn handle_input(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        rect: Rect,
        graph: &mut EventGraph,
        catalog: &CommandCatalog,
    ) {
        let origin = rect.min.to_vec2();
        let (hover, moving, primary_pressed, secondary_pressed, primary_released, scroll) = ui.input(|i| {
            (
                i.pointer.hover_pos(),
                i.pointer.is_moving(),
                i.pointer.primary_pressed(),
                i.pointer.secondary_pressed(),
                i.pointer.primary_released(),
                i.raw_scroll_delta.y,
            )
        });

        let Some(pointer) = hover.map(|pos| pos - origin) else {
            self.handle_pointer(graph, catalog, PointerEvent::Leave);
            return;
        };

        if moving {
            self.handle_pointer(graph, catalog, PointerEvent::Move { pos: pointer });
        }
        if response.hovered() {
            if primary_pressed {
                let event = PointerEvent::Down { pos: pointer, button: PointerButton::Primary };
                self.handle_pointer(graph, catalog, event);
            }
            if secondary_pressed {
                let event = PointerEvent::Down { pos: pointer, button: PointerButton::Secondary };
                self.handle_pointer(graph, catalog, event);
            }
            if scroll != 0.0 {
                self.handle_pointer(graph, catalog, PointerEvent::Scroll { pos: pointer, delta: scroll });
            }
        }
        if primary_released {
            self.handle_pointer(graph, catalog, PointerEvent::Up { pos: pointer });
        }

        if ui.ctx().wants_keyboard_input() {
            return;
        }
        let (escape, delete) = ui.input(|i| (i.key_pressed(egui::Key::Escape), i.key_pressed(egui::Key::Delete)));
        if escape {
            self.cancel_link();
            self.close_picker();
        }
        if delete {
            if let Err(err) = self.delete_selected(graph) {
                tracing::warn!("Delete failed: {}", err);
            }
        }
    }

    fn draw_grid(&self, painter: &egui::Painter, rect: Rect) {
        let view = self.view();
        let spacing = GRID_SPACING * view.zoom;
        if spacing < 4.0 {
            return;
        }
        let major_spacing = spacing * 5.0;

        let grid_color_minor = Color32::from_rgba_unmultiplied(60, 60, 60, 100);
        let grid_color_major = Color32::from_rgba_unmultiplied(80, 80, 80, 150);

        for (step, color) in [(spacing, grid_color_minor), (major_spacing, grid_color_major)] {
            let mut x = rect.left() + view.pan.x.rem_euclid(step);
            while x < rect.right() {
                painter.line_segment(
                    [Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())],
                    Stroke::new(1.0, color),
                );
                x += step;
            }

            let mut y = rect.top() + view.pan.y.rem_euclid(step);
            while y < rect.bottom() {
                painter.line_segment(
                    [Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)],
                    Stroke::new(1.0, color),
                );
                y += step;
            }
        }
    }

    fn draw_links(&self, painter: &egui::Painter, rect: Rect) {
        let origin = rect.min.to_vec2();
        let view = self.view();
        let layout = self.layout();

        for link in &layout.links {
            let (Some(source), Some(target)) = (layout.node(link.source), layout.node(link.target)) else {
                continue;
            };
            let (Some(source_center), Some(target_center)) =
                (self.position(link.source), self.position(link.target))
            else {
                continue;
            };
            let Some(from) = source.metrics.output_port(source_center, link.branch) else {
                continue;
            };
            let to = target.metrics.input_port(target_center);

            let from = view.graph_to_screen(from) + origin;
            let to = view.graph_to_screen(to) + origin;
            draw_arrow(painter, from, to, view.zoom, LINK_COLOR);
        }
    }

    fn draw_nodes(&self, painter: &egui::Painter, rect: Rect) {
        let origin = rect.min.to_vec2();
        let view = self.view();
        let hot = self.hot_port().map(|hot| hot.port);

        for node in &self.layout().nodes {
            let Some(center) = self.position(node.handle) else {
                continue;
            };
            let graph_rect = node.metrics.rect(center);
            let screen_rect = Rect::from_min_max(
                view.graph_to_screen(graph_rect.min) + origin,
                view.graph_to_screen(graph_rect.max) + origin,
            );
            if !screen_rect.intersects(rect) {
                continue;
            }

            let is_selected = self.selected() == Some(node.handle);
            let is_hovered = self.hovered_node() == Some(node.handle);
            let rounding = NODE_ROUNDING * view.zoom;

            let bg_color = if is_selected {
                Color32::from_rgb(60, 70, 90)
            } else {
                Color32::from_rgb(45, 45, 48)
            };
            painter.rect_filled(screen_rect, rounding, bg_color);

            let outline = if is_selected {
                Stroke::new(2.0, SELECTION_COLOR)
            } else if node.label.missing {
                Stroke::new(1.5, MISSING_COLOR)
            } else if is_hovered {
                Stroke::new(1.0, Color32::from_gray(160))
            } else {
                Stroke::new(1.0, Color32::from_gray(90))
            };
            painter.rect_stroke(screen_rect, rounding, outline);

            self.draw_label(painter, node, center, origin);

            for branch in 0..node.metrics.output_ports.len() {
                let Some(port) = node.metrics.output_port(center, branch) else {
                    continue;
                };
                let port = view.graph_to_screen(port) + origin;
                let is_hot = hot.is_some_and(|hot| hot.node == node.handle && hot.branch == branch);
                let color = if is_hot { HOT_PORT_COLOR } else { PORT_COLOR };
                painter.circle_filled(port, node.metrics.port_radius() * view.zoom, color);
                painter.circle_stroke(
                    port,
                    node.metrics.port_radius() * view.zoom,
                    Stroke::new(1.0, Color32::from_gray(30)),
                );
            }
        }
    }

    fn draw_label(&self, painter: &egui::Painter, node: &LayoutNode, center: Pos2, origin: Vec2) {
        let view = self.view();
        let metrics: &NodeMetrics = &node.metrics;
        let font = egui::FontId::monospace(self.config().style.font_size * view.zoom);
        let padding = metrics.padding * view.zoom;
        let line_height = metrics.line_height * view.zoom;
        let top_left = view.graph_to_screen(metrics.rect(center).min) + origin;

        for (row, line) in node.label.lines.iter().enumerate() {
            let color = if row == 0 {
                Color32::WHITE
            } else {
                Color32::from_gray(200)
            };
            painter.text(
                top_left + Vec2::new(padding, padding + line_height * (row as f32 + 0.5)),
                egui::Align2::LEFT_CENTER,
                line,
                font.clone(),
                color,
            );
        }

        for (branch, label) in node.label.branches.iter().enumerate() {
            let Some(port) = metrics.output_port(center, branch) else {
                continue;
            };
            painter.text(
                view.graph_to_screen(port) + origin - Vec2::new(padding, 0.0),
                egui::Align2::RIGHT_CENTER,
                label,
                font.clone(),
                Color32::from_gray(200),
            );
        }
    }

    fn draw_rubber_band(&self, painter: &egui::Painter, rect: Rect) {
        let Interaction::LinkPending(pending) = self.interaction() else {
            return;
        };
        let origin = rect.min.to_vec2();
        painter.extend(egui::Shape::dashed_line(
            &[pending.anchor + origin, pending.pointer + origin],
            Stroke::new(LINK_THICKNESS, HOT_PORT_COLOR),
            6.0,
            4.0,
        ));
        painter.circle_filled(pending.anchor + origin, 3.0, HOT_PORT_COLOR);
    }

    fn draw_status_bar(&self, painter: &egui::Painter, rect: Rect, graph: &EventGraph) {
        let mode = match self.interaction() {
            Interaction::Idle => "",
            Interaction::LinkPending(_) => " | Linking (Esc to cancel)",
            Interaction::DraggingNode { .. } => " | Moving node",
            Interaction::Panning { .. } => " | Panning",
        };
        let selected = self
            .selected()
            .map_or_else(|| "none".to_string(), |node| node.to_string());

        painter.text(
            Pos2::new(rect.left() + 5.0, rect.bottom() - 11.0),
            egui::Align2::LEFT_CENTER,
            format!(
                "Nodes: {} | Links: {} | Zoom: {:.0}% | Selected: {}{}",
                graph.node_count(),
                self.layout().links.len(),
                self.view().zoom * 100.0,
                selected,
                mode,
            ),
            egui::FontId::proportional(11.0),
            Color32::from_gray(150),
        );
    }

    fn show_picker(&mut self, ctx: &egui::Context, rect: Rect, graph: &mut EventGraph, catalog: &CommandCatalog) {
        let Some(at) = self.picker_at() else {
            return;
        };

        let mut chosen: Option<String> = None;
        let mut close = false;
        egui::Window::new("Insert command")
            .fixed_pos(at + rect.min.to_vec2())
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                if catalog.is_empty() {
                    ui.label("No commands loaded");
                }
                egui::ScrollArea::vertical().max_height(240.0).show(ui, |ui| {
                    for name in catalog.display_names() {
                        if ui.button(name).clicked() {
                            chosen = Some(name.to_string());
                        }
                    }
                });
                ui.separator();
                if ui.button("Cancel").clicked() {
                    close = true;
                }
            });

        if let Some(name) = chosen {
            if let Err(err) = self.insert_command(graph, catalog, &name, at) {
                tracing::warn!("Could not insert {:?}: {}", name, err);
                self.close_picker();
            }
        } else if close {
            self.close_picker();
        }
    }
}

/// Straight link with an arrowhead at `to`
fn draw_arrow(painter: &egui::Painter, from: Pos2, to: Pos2, zoom: f32, color: Color32) {
    painter.line_segment([from, to], Stroke::new(LINK_THICKNESS * zoom.max(0.5), color));

    let delta = to - from;
    if delta.length_sq() < f32::EPSILON {
        return;
    }
    let dir = delta.normalized();
    let normal = dir.rot90();
    let size = ARROW_SIZE * zoom;
    let base = to - dir * size;
    painter.add(egui::Shape::convex_polygon(
        vec![to, base + normal * size * 0.5, base - normal * size * 0.5],
        color,
        Stroke::NONE,
    ));
}
