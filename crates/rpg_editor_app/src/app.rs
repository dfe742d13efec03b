// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor window setup and event loop.

use crate::catalog_loader::CatalogLoader;
use crate::catalog_watcher::CatalogWatcher;
use crate::config::EditorConfig;
use crate::notifications::Notifications;
use egui_wgpu::wgpu;
use rpg_editor_graph::{EditorSession, EventDocument, NodeHandle, SurfaceEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

/// Editor application errors
#[derive(Debug, Error)]
pub enum EditorError {
    /// Window creation failed
    #[error("Failed to create window: {0}")]
    WindowCreation(#[from] winit::error::OsError),

    /// Renderer initialization failed
    #[error("Failed to initialize renderer: {0}")]
    RendererInit(String),

    /// Event loop error
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

/// Result type for editor operations
pub type Result<T> = std::result::Result<T, EditorError>;

/// Graphics state for wgpu rendering
struct GraphicsState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    egui_renderer: egui_wgpu::Renderer,
}

impl GraphicsState {
    fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| EditorError::RendererInit(e.to_string()))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| EditorError::RendererInit("no suitable GPU adapter".to_string()))?;

        tracing::info!("Using GPU: {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("RPG Editor Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| EditorError::RendererInit(e.to_string()))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| EditorError::RendererInit("surface reports no formats".to_string()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let egui_renderer = egui_wgpu::Renderer::new(&device, surface_format, None, 1, false);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            egui_renderer,
        })
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    fn render(
        &mut self,
        egui_ctx: &egui::Context,
        full_output: egui::FullOutput,
        window: &Window,
    ) -> std::result::Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Editor Encoder"),
        });

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        let paint_jobs = egui_ctx.tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.egui_renderer.update_texture(&self.device, &self.queue, *id, image_delta);
        }

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Editor Render Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color {
                                r: 0.1,
                                g: 0.1,
                                b: 0.1,
                                a: 1.0,
                            }),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();

            self.egui_renderer.render(&mut render_pass, &paint_jobs, &screen_descriptor);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        Ok(())
    }
}

/// Action picked in the inspector, applied after the panel is drawn
enum InspectorAction {
    Bind(usize, String),
    Disconnect(usize),
    Delete,
}

/// Snapshot of the selected node for the inspector
struct Inspection {
    node: NodeHandle,
    title: String,
    missing: bool,
    params: Vec<(String, String)>,
    branches: Vec<(String, Option<NodeHandle>)>,
}

/// Editor state independent of the window
struct EditorInner {
    session: EditorSession,
    config: EditorConfig,
    document_path: PathBuf,
    loader: CatalogLoader,
    watcher: Option<CatalogWatcher>,
    notifications: Notifications,
    show_unsaved_warning: bool,
    request_exit: bool,
}

impl EditorInner {
    fn new(root: PathBuf, document_path: PathBuf, config: EditorConfig) -> Self {
        let mut session = EditorSession::new(config.catalog.clone(), config.surface);
        let mut notifications = Notifications::default();
        let loader = CatalogLoader::new();

        let ticket = session.open_root(&root);
        loader.request(ticket, config.catalog.clone());

        let document = if document_path.exists() {
            match EventDocument::load(&document_path) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::error!("Failed to load {:?}: {e}", document_path);
                    notifications.error(format!("Could not open {}: {e}", document_path.display()));
                    new_document_for(&document_path)
                }
            }
        } else {
            tracing::info!("{:?} does not exist yet, starting a new event", document_path);
            new_document_for(&document_path)
        };
        session.open_document(Some(document));

        let commands_dir = config.catalog.commands_path(&root);
        let watcher = match CatalogWatcher::new(
            &commands_dir,
            &config.catalog.extension,
            Duration::from_millis(config.watch_debounce_ms),
        ) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!("Not watching {:?}: {e}", commands_dir);
                None
            }
        };

        Self {
            session,
            config,
            document_path,
            loader,
            watcher,
            notifications,
            show_unsaved_warning: false,
            request_exit: false,
        }
    }

    fn update(&mut self, ctx: &egui::Context) {
        for (ticket, catalog) in self.loader.poll() {
            let count = catalog.len();
            if self.session.accept_catalog(&ticket, catalog) && count == 0 {
                self.notifications.warn("No commands found under the authoring root");
            }
        }
        if self.watcher.as_ref().is_some_and(CatalogWatcher::poll_changed) {
            self.reload_catalog();
        }

        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Save (Ctrl+S)").clicked() {
                        self.save();
                        ui.close_menu();
                    }
                    if ui.button("Reload commands").clicked() {
                        self.reload_catalog();
                        ui.close_menu();
                    }
                    if ui.button("Save settings").clicked() {
                        self.save_settings();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Quit").clicked() {
                        self.request_close();
                        ui.close_menu();
                    }
                });
                ui.separator();
                let marker = if self.session.is_dirty() { " *" } else { "" };
                ui.label(format!("{}{}", self.document_path.display(), marker));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let commands = ui.label(format!("{} commands", self.session.catalog().len()));
                    match &self.watcher {
                        Some(watcher) => commands.on_hover_text(format!("Watching {}", watcher.dir().display())),
                        None => commands.on_hover_text("Not watching for script changes"),
                    };
                });
            });
        });

        egui::SidePanel::right("inspector")
            .default_width(260.0)
            .show(ctx, |ui| self.inspector_ui(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                self.session.ui(ui);
            });

        for event in self.session.poll_events() {
            match event {
                SurfaceEvent::LinkRejected(err) => {
                    self.notifications.warn(format!("Link refused: {err}"));
                }
                SurfaceEvent::SelectionChanged(node) => tracing::debug!("Selection: {:?}", node),
                SurfaceEvent::DocumentChanged | SurfaceEvent::ContextMenuRequested(_) => {}
            }
        }

        self.show_unsaved_warning_dialog(ctx);
        self.notifications.show(ctx);
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let save = ctx.input_mut(|i| {
            i.consume_shortcut(&egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S))
        });
        if save {
            self.save();
        }
    }

    fn inspect(&self) -> Option<Inspection> {
        let node = self.session.surface().selected()?;
        let graph = self.session.graph();
        let catalog = self.session.catalog();
        let instance = graph.node(node)?;

        let (title, missing) = if node.is_root() {
            ("Root".to_string(), false)
        } else {
            match graph.command_of(catalog, node) {
                Ok(Some(command)) => (command.display_name.clone(), false),
                _ => (instance.command_id.clone(), true),
            }
        };

        let params = graph
            .param_names(catalog, node)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), instance.bound_params.get(i).cloned().unwrap_or_default()))
            .collect();

        let labels: Vec<String> = if node.is_root() {
            vec![rpg_editor_graph::geometry::ROOT_BRANCH_LABEL.to_string()]
        } else {
            catalog
                .get(&instance.command_id)
                .map(|command| command.branches.clone())
                .unwrap_or_default()
        };
        let branches = labels
            .into_iter()
            .enumerate()
            .map(|(branch, label)| (label, graph.target_of(node, branch)))
            .collect();

        Some(Inspection {
            node,
            title,
            missing,
            params,
            branches,
        })
    }

    fn inspector_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("Node");
        ui.separator();

        let Some(inspection) = self.inspect() else {
            ui.label("Select a node, or right-click the canvas to insert a command.");
            return;
        };

        let mut actions = Vec::new();
        ui.label(egui::RichText::new(&inspection.title).strong());
        ui.label(format!("Handle {}", inspection.node));
        if inspection.missing {
            ui.colored_label(egui::Color32::from_rgb(230, 90, 90), "Command not in catalog");
        }

        if !inspection.params.is_empty() {
            ui.add_space(8.0);
            ui.label("Parameters");
            egui::Grid::new("params").num_columns(2).show(ui, |ui| {
                for (index, (name, value)) in inspection.params.iter().enumerate() {
                    ui.label(name);
                    let mut edited = value.clone();
                    if ui.text_edit_singleline(&mut edited).changed() {
                        actions.push(InspectorAction::Bind(index, edited));
                    }
                    ui.end_row();
                }
            });
        }

        if !inspection.branches.is_empty() {
            ui.add_space(8.0);
            ui.label("Branches");
            egui::Grid::new("branches").num_columns(3).show(ui, |ui| {
                for (branch, (label, target)) in inspection.branches.iter().enumerate() {
                    ui.label(label);
                    match target {
                        Some(target) => {
                            ui.label(format!("-> {target}"));
                            if ui.small_button("Unlink").clicked() {
                                actions.push(InspectorAction::Disconnect(branch));
                            }
                        }
                        None => {
                            ui.weak("not linked");
                            ui.label("");
                        }
                    }
                    ui.end_row();
                }
            });
        }

        if !inspection.node.is_root() {
            ui.add_space(12.0);
            if ui.button("Delete node (Del)").clicked() {
                actions.push(InspectorAction::Delete);
            }
        }

        for action in actions {
            let result = match action {
                InspectorAction::Bind(index, value) => self.session.bind_param(inspection.node, index, value),
                InspectorAction::Disconnect(branch) => self.session.disconnect(inspection.node, branch).map(|_| ()),
                InspectorAction::Delete => self.session.remove_node(inspection.node).map(|_| ()),
            };
            if let Err(e) = result {
                self.notifications.warn(e.to_string());
            }
        }
    }

    fn reload_catalog(&mut self) {
        if let Some(ticket) = self.session.reload_catalog() {
            self.loader.request(ticket, self.config.catalog.clone());
        }
    }

    fn save(&mut self) -> bool {
        match self.session.document().save(&self.document_path) {
            Ok(()) => {
                self.session.mark_saved();
                self.notifications.info(format!("Saved {}", self.document_path.display()));
                true
            }
            Err(e) => {
                tracing::error!("Failed to save {:?}: {e}", self.document_path);
                self.notifications.error(format!("Save failed: {e}"));
                false
            }
        }
    }

    fn save_settings(&mut self) {
        let Some(root) = self.session.root() else {
            return;
        };
        let path = EditorConfig::path_for(root);
        match self.config.save(&path) {
            Ok(()) => {
                self.notifications.info(format!("Saved settings to {}", path.display()));
            }
            Err(e) => {
                tracing::error!("Failed to save settings to {:?}: {e}", path);
                self.notifications.error(format!("Could not save settings: {e}"));
            }
        }
    }

    fn request_close(&mut self) {
        if self.session.is_dirty() {
            self.show_unsaved_warning = true;
        } else {
            self.request_exit = true;
        }
    }

    fn show_unsaved_warning_dialog(&mut self, ctx: &egui::Context) {
        if !self.show_unsaved_warning {
            return;
        }

        let mut should_close = false;
        let mut proceed = false;

        egui::Window::new("Unsaved Changes")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label("This event has unsaved changes. Quit anyway?");
                ui.add_space(10.0);

                ui.horizontal(|ui| {
                    if ui.button("Cancel").clicked() {
                        should_close = true;
                    }
                    if ui.button("Don't Save").clicked() {
                        proceed = true;
                        should_close = true;
                    }
                    if ui.button("Save").clicked() {
                        proceed = self.save();
                        should_close = true;
                    }
                });
            });

        if should_close {
            self.show_unsaved_warning = false;
            self.request_exit = proceed;
        }
    }
}

fn new_document_for(path: &Path) -> EventDocument {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled");
    EventDocument::new(stem, stem)
}

/// Running state of the editor
struct EditorRunning {
    window: Arc<Window>,
    graphics: GraphicsState,
    egui_ctx: egui::Context,
    egui_state: egui_winit::State,
    editor: EditorInner,
}

/// Main editor application
pub struct EditorApp {
    running: Option<EditorRunning>,
    startup: Option<(PathBuf, PathBuf, EditorConfig)>,
    error: Option<EditorError>,
}

impl EditorApp {
    /// Create the application for an authoring root and event document
    pub fn new(root: PathBuf, document_path: PathBuf, config: EditorConfig) -> Self {
        Self {
            running: None,
            startup: Some((root, document_path, config)),
            error: None,
        }
    }

    /// Run the editor until the window closes
    pub fn run(root: PathBuf, document_path: PathBuf, config: EditorConfig) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut app = EditorApp::new(root, document_path, config);
        event_loop.run_app(&mut app)?;

        match app.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<EditorRunning> {
        let Some((root, document_path, config)) = self.startup.take() else {
            return Err(EditorError::RendererInit("editor already started".to_string()));
        };

        tracing::info!("Creating editor window...");
        let [width, height] = config.window_size;
        let window_attrs = Window::default_attributes()
            .with_title(format!("RPG Editor - {}", document_path.display()))
            .with_inner_size(winit::dpi::LogicalSize::new(width, height))
            .with_min_inner_size(winit::dpi::LogicalSize::new(640, 480));
        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let graphics = GraphicsState::new(window.clone())?;
        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui_ctx.viewport_id(),
            &window,
            Some(window.scale_factor() as f32),
            None,
            Some(2 * 1024),
        );

        let editor = EditorInner::new(root, document_path, config);
        tracing::info!("Editor initialized, window size {:?}", window.inner_size());

        Ok(EditorRunning {
            window,
            graphics,
            egui_ctx,
            egui_state,
            editor,
        })
    }
}

impl ApplicationHandler for EditorApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(e) => {
                tracing::error!("{e}");
                self.error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(running) = &mut self.running else {
            return;
        };

        let response = running.egui_state.on_window_event(&running.window, &event);
        if response.consumed {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                running.editor.request_close();
                if running.editor.request_exit {
                    tracing::info!("Close requested, exiting...");
                    event_loop.exit();
                }
            }
            WindowEvent::Resized(new_size) => {
                tracing::debug!("Window resized to {:?}", new_size);
                running.graphics.resize(new_size);
                running.window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                let raw_input = running.egui_state.take_egui_input(&running.window);
                let full_output = running.egui_ctx.run(raw_input, |ctx| {
                    running.editor.update(ctx);
                });

                if running.editor.request_exit {
                    event_loop.exit();
                    return;
                }

                running
                    .egui_state
                    .handle_platform_output(&running.window, full_output.platform_output.clone());

                match running.graphics.render(&running.egui_ctx, full_output, &running.window) {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = running.window.inner_size();
                        running.graphics.resize(size);
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        tracing::error!("Out of GPU memory!");
                        event_loop.exit();
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        tracing::warn!("Surface timeout");
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }
}
