// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dismissible toast notifications.

use std::time::{Duration, Instant};

/// Toast severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational
    Info,
    /// Something was refused or skipped
    Warning,
    /// An operation failed
    Error,
}

impl Severity {
    fn color(self) -> egui::Color32 {
        match self {
            Severity::Info => egui::Color32::from_rgb(120, 170, 230),
            Severity::Warning => egui::Color32::from_rgb(230, 190, 90),
            Severity::Error => egui::Color32::from_rgb(230, 90, 90),
        }
    }
}

/// One toast
#[derive(Debug, Clone)]
pub struct Toast {
    /// Unique id
    pub id: u64,
    /// Severity
    pub severity: Severity,
    /// Message text
    pub message: String,
    created: Instant,
}

/// Stack of toasts shown in the bottom-right corner
pub struct Notifications {
    toasts: Vec<Toast>,
    next_id: u64,
    lifetime: Duration,
    max_visible: usize,
}

impl Notifications {
    /// Create an empty stack whose toasts expire after `lifetime`
    pub fn new(lifetime: Duration) -> Self {
        Self {
            toasts: Vec::new(),
            next_id: 0,
            lifetime,
            max_visible: 5,
        }
    }

    /// Add a toast
    pub fn push(&mut self, severity: Severity, message: impl Into<String>) -> u64 {
        self.push_at(severity, message, Instant::now())
    }

    fn push_at(&mut self, severity: Severity, message: impl Into<String>, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.toasts.push(Toast {
            id,
            severity,
            message: message.into(),
            created: now,
        });
        if self.toasts.len() > self.max_visible {
            self.toasts.remove(0);
        }
        id
    }

    /// Add an info toast
    pub fn info(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Info, message)
    }

    /// Add a warning toast
    pub fn warn(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Warning, message)
    }

    /// Add an error toast
    pub fn error(&mut self, message: impl Into<String>) -> u64 {
        self.push(Severity::Error, message)
    }

    /// Remove a toast
    pub fn dismiss(&mut self, id: u64) {
        self.toasts.retain(|toast| toast.id != id);
    }

    /// Drop toasts older than the lifetime. Errors stay until dismissed.
    pub fn expire(&mut self, now: Instant) {
        let lifetime = self.lifetime;
        self.toasts.retain(|toast| {
            toast.severity == Severity::Error || now.saturating_duration_since(toast.created) < lifetime
        });
    }

    /// Visible toasts, oldest first
    pub fn toasts(&self) -> &[Toast] {
        &self.toasts
    }

    /// Draw the stack and handle dismiss clicks
    pub fn show(&mut self, ctx: &egui::Context) {
        self.expire(Instant::now());
        if self.toasts.is_empty() {
            return;
        }

        let mut dismissed = None;
        egui::Area::new(egui::Id::new("notifications"))
            .anchor(egui::Align2::RIGHT_BOTTOM, [-12.0, -28.0])
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                for toast in self.toasts() {
                    egui::Frame::popup(ui.style())
                        .stroke(egui::Stroke::new(1.0, toast.severity.color()))
                        .show(ui, |ui| {
                            ui.set_max_width(360.0);
                            ui.horizontal(|ui| {
                                ui.colored_label(toast.severity.color(), &toast.message);
                                if ui.small_button("x").clicked() {
                                    dismissed = Some(toast.id);
                                }
                            });
                        });
                    ui.add_space(4.0);
                }
            });

        if let Some(id) = dismissed {
            self.dismiss(id);
        }
        ctx.request_repaint_after(Duration::from_millis(250));
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new(Duration::from_secs(6))
    }
}
