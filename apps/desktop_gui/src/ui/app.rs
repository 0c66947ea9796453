use std::{borrow::Cow, path::PathBuf, sync::Arc};

use arboard::{Clipboard, ImageData};
use client_core::{AuthProvider, Completion, GateView, ImageWorkflow, ProcessError, SessionGate};
use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use shared::{domain::WorkflowStatus, protocol::MAX_IMAGE_BYTES};
use tracing::{debug, info, warn};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::{
    events::{classify_sign_in_failure, UiError, UiErrorContext, UiEvent},
    orchestration::dispatch_backend_command,
    selection::LoadTracker,
};
use crate::ui::preview::{Preview, PreviewCache};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "webp", "bmp"];

/// Values resolved from the command line that the UI displays.
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub processor_url: String,
    pub auth_label: String,
}

#[derive(Default)]
struct SignInForm {
    email: String,
    password: String,
    pending: bool,
    error: Option<String>,
    focus_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProcessorHealth {
    Unknown,
    Online,
    Offline(String),
}

pub struct BgRemoverApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    gate: SessionGate,
    previews: PreviewCache,
    loads: LoadTracker,
    sign_in: SignInForm,
    status: String,
    health: ProcessorHealth,
    startup: StartupConfig,
}

impl BgRemoverApp {
    pub fn new(
        cmd_tx: Sender<BackendCommand>,
        ui_rx: Receiver<UiEvent>,
        provider: Arc<dyn AuthProvider>,
        startup: StartupConfig,
    ) -> Self {
        let mut gate = SessionGate::new(provider);
        gate.begin_mount();

        let mut status = "Checking session...".to_string();
        dispatch_backend_command(&cmd_tx, BackendCommand::FetchSession, &mut status);
        dispatch_backend_command(&cmd_tx, BackendCommand::CheckHealth, &mut status);

        Self {
            cmd_tx,
            ui_rx,
            gate,
            previews: PreviewCache::default(),
            loads: LoadTracker::default(),
            sign_in: SignInForm::default(),
            status,
            health: ProcessorHealth::Unknown,
            startup,
        }
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::Error(err) => self.show_error(err),
                UiEvent::SessionFetched(result) => {
                    let view = self.gate.apply_initial(result);
                    self.status = match view {
                        GateView::Workflow => "Signed in".to_string(),
                        _ => "Sign in to continue".to_string(),
                    };
                }
                UiEvent::SignInFinished(result) => {
                    self.sign_in.pending = false;
                    match result {
                        Ok(()) => {
                            self.sign_in.password.clear();
                            self.sign_in.error = None;
                        }
                        Err(err) => {
                            self.show_error(UiError::from_auth(UiErrorContext::SignIn, &err));
                            self.sign_in.error = Some(classify_sign_in_failure(&err));
                        }
                    }
                }
                UiEvent::SignOutFinished(result) => {
                    if let Err(err) = result {
                        self.show_error(UiError::from_auth(UiErrorContext::SignOut, &err));
                    }
                }
                UiEvent::ImageLoaded { token, result } => {
                    if !self.loads.finish(token, self.gate.workflow_epoch()) {
                        continue;
                    }
                    match result {
                        Ok(image) => {
                            if let Some(workflow) = self.gate.workflow_mut() {
                                self.status = format!(
                                    "Selected {} ({})",
                                    image.file_name(),
                                    human_readable_bytes(image.bytes().len() as u64)
                                );
                                workflow.select(image);
                            } else {
                                debug!("image loaded after sign-out; ignoring");
                            }
                        }
                        Err(err) => self.show_error(UiError::from_message(
                            UiErrorContext::LoadImage,
                            err.to_string(),
                        )),
                    }
                }
                UiEvent::ProcessingFinished {
                    generation,
                    outcome,
                } => {
                    let Some(workflow) = self.gate.workflow_mut() else {
                        debug!(generation, "processing finished after sign-out; ignoring");
                        continue;
                    };
                    match workflow.complete(generation, outcome) {
                        Completion::Applied(WorkflowStatus::Succeeded) => {
                            self.status = "Background removed".to_string();
                        }
                        Completion::Applied(_) => {
                            self.status = workflow
                                .error_message()
                                .unwrap_or("Failed to remove background")
                                .to_string();
                        }
                        Completion::Discarded => {
                            debug!(generation, "discarded stale processing result");
                        }
                    }
                }
                UiEvent::ResultSaved(path) => {
                    self.status = format!("Saved image to {}", path.display());
                }
                UiEvent::HealthChecked(result) => {
                    self.health = match result {
                        Ok(_) => ProcessorHealth::Online,
                        Err(err) => ProcessorHealth::Offline(err.to_string()),
                    };
                }
            }
        }

        if self.gate.pump() > 0 && self.gate.view() == GateView::SignIn {
            self.loads.cancel();
            self.sign_in.pending = false;
            self.status = "Signed out".to_string();
        }
    }

    fn show_error(&mut self, err: UiError) {
        warn!(
            category = ?err.category(),
            context = ?err.context(),
            reauth = err.requires_reauth(),
            message = err.message(),
            "ui error"
        );
        self.status = err.message().to_string();
    }

    fn queue(&mut self, cmd: BackendCommand) -> bool {
        dispatch_backend_command(&self.cmd_tx, cmd, &mut self.status)
    }

    fn choose_image(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", &IMAGE_EXTENSIONS)
            .pick_file()
        {
            self.load_image(path);
        }
    }

    fn load_image(&mut self, path: PathBuf) {
        let token = self.loads.begin(self.gate.workflow_epoch());
        self.status = format!("Loading {}...", path.display());
        if !self.queue(BackendCommand::LoadImage { path, token }) {
            self.loads.cancel();
        }
    }

    fn submit(&mut self) {
        let Some(workflow) = self.gate.workflow_mut() else {
            return;
        };
        let ticket = match workflow.submit() {
            Ok(ticket) => ticket,
            Err(err) => {
                self.status = err.to_string();
                return;
            }
        };
        let generation = ticket.generation;
        info!(generation, "submitting image");
        self.status = "Removing background...".to_string();
        if !dispatch_backend_command(
            &self.cmd_tx,
            BackendCommand::RemoveBackground { ticket },
            &mut self.status,
        ) {
            workflow.complete(
                generation,
                Err(ProcessError::Transport("backend worker unavailable".to_string())),
            );
        }
    }

    fn download(&mut self) {
        let Some(workflow) = self.gate.workflow() else {
            return;
        };
        let download = match workflow.download() {
            Ok(download) => download,
            Err(err) => {
                self.status = err.to_string();
                return;
            }
        };
        let Some(path) = rfd::FileDialog::new()
            .set_file_name(download.file_name)
            .add_filter("PNG image", &["png"])
            .save_file()
        else {
            return;
        };
        let bytes = download.bytes.to_vec();
        self.queue(BackendCommand::SaveResult { path, bytes });
    }

    fn copy_result(&mut self) {
        let Some(processed) = self.gate.workflow().and_then(ImageWorkflow::processed) else {
            return;
        };
        let rgba = match image::load_from_memory(processed.bytes()) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(err) => {
                self.status = format!("Failed to copy image: {err}");
                return;
            }
        };
        let image = ImageData {
            width: rgba.width() as usize,
            height: rgba.height() as usize,
            bytes: Cow::Owned(rgba.into_raw()),
        };
        match Clipboard::new().and_then(|mut clipboard| clipboard.set_image(image)) {
            Ok(()) => self.status = "Copied result to clipboard".to_string(),
            Err(err) => self.status = format!("Failed to copy image: {err}"),
        }
    }

    fn reset(&mut self) {
        self.loads.cancel();
        if let Some(workflow) = self.gate.workflow_mut() {
            workflow.reset();
            self.status = "Ready".to_string();
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        if self.gate.view() != GateView::Workflow {
            return;
        }
        let dropped: Option<PathBuf> =
            ctx.input(|i| i.raw.dropped_files.iter().find_map(|file| file.path.clone()));
        if let Some(path) = dropped {
            self.load_image(path);
        }
    }

    fn show_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("app_top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Background Remover");
                ui.separator();
                let (text, color) = match &self.health {
                    ProcessorHealth::Unknown => ("processor: checking".to_string(), ui.visuals().weak_text_color()),
                    ProcessorHealth::Online => (
                        format!("processor: {}", self.startup.processor_url),
                        egui::Color32::from_rgb(80, 170, 90),
                    ),
                    ProcessorHealth::Offline(_) => (
                        format!("processor offline: {}", self.startup.processor_url),
                        ui.visuals().error_fg_color,
                    ),
                };
                let label = ui.colored_label(color, text);
                if let ProcessorHealth::Offline(reason) = &self.health {
                    label.on_hover_text(reason.as_str());
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if self.gate.view() == GateView::Workflow {
                        if ui.button("Sign Out").clicked() {
                            self.queue(BackendCommand::SignOut);
                        }
                        if let Some(email) = self.gate.session().and_then(|s| s.email.as_deref()) {
                            ui.weak(email);
                        }
                    } else {
                        ui.weak(self.startup.auth_label.as_str());
                    }
                });
            });
        });
    }

    fn show_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.small(self.status.as_str());
        });
    }

    fn show_loading_screen(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| {
                ui.add(egui::Spinner::new().size(32.0));
            });
        });
    }

    fn show_sign_in_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let avail = ui.available_size();
            let card_width = avail.x.clamp(360.0, 460.0);
            ui.add_space((avail.y * 0.15).clamp(18.0, 120.0));

            ui.vertical_centered(|ui| {
                ui.set_width(card_width);
                egui::Frame::NONE
                    .fill(ui.visuals().faint_bg_color)
                    .corner_radius(14.0)
                    .stroke(egui::Stroke::new(
                        1.0,
                        ui.visuals().widgets.noninteractive.bg_stroke.color,
                    ))
                    .inner_margin(egui::Margin::symmetric(20, 18))
                    .show(ui, |ui| {
                        ui.style_mut().spacing.item_spacing = egui::vec2(10.0, 10.0);
                        ui.heading("Sign in");
                        ui.weak("Sign in to remove image backgrounds.");

                        ui.label(egui::RichText::new("Email").strong());
                        let email = ui.add_sized(
                            [ui.available_width(), 30.0],
                            egui::TextEdit::singleline(&mut self.sign_in.email)
                                .id_salt("sign_in_email")
                                .hint_text("you@example.com"),
                        );
                        if !self.sign_in.focus_requested {
                            self.sign_in.focus_requested = true;
                            email.request_focus();
                        }

                        ui.label(egui::RichText::new("Password").strong());
                        let password = ui.add_sized(
                            [ui.available_width(), 30.0],
                            egui::TextEdit::singleline(&mut self.sign_in.password)
                                .id_salt("sign_in_password")
                                .password(true),
                        );
                        let submitted_with_enter =
                            password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                        if let Some(error) = &self.sign_in.error {
                            ui.colored_label(ui.visuals().error_fg_color, error.as_str());
                        }

                        let can_submit = !self.sign_in.pending
                            && !self.sign_in.email.trim().is_empty()
                            && !self.sign_in.password.is_empty();
                        ui.horizontal(|ui| {
                            let clicked = ui
                                .add_enabled(can_submit, egui::Button::new("Sign In"))
                                .clicked();
                            if self.sign_in.pending {
                                ui.add(egui::Spinner::new());
                            }
                            if can_submit && (clicked || submitted_with_enter) {
                                self.sign_in.pending = true;
                                self.sign_in.error = None;
                                let cmd = BackendCommand::SignIn {
                                    email: self.sign_in.email.trim().to_string(),
                                    password: self.sign_in.password.clone(),
                                };
                                if !self.queue(cmd) {
                                    self.sign_in.pending = false;
                                }
                            }
                        });
                    });
            });
        });
    }

    fn show_workflow_screen(&mut self, ctx: &egui::Context) {
        let Some(workflow) = self.gate.workflow() else {
            return;
        };
        let status = workflow.status();
        let can_submit = workflow.can_submit();
        let selected_label = workflow.selected().map(|image| {
            format!(
                "{} ({})",
                image.file_name(),
                human_readable_bytes(image.bytes().len() as u64)
            )
        });
        let error_message = workflow.error_message().map(str::to_string);
        let loading = self.loads.is_pending();

        let mut choose = false;
        let mut submit = false;
        let mut download = false;
        let mut copy = false;
        let mut reset = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                choose = ui.button("Choose Image...").clicked();
                submit = ui
                    .add_enabled(can_submit, egui::Button::new("Remove Background"))
                    .clicked();
                let succeeded = status == WorkflowStatus::Succeeded;
                download = ui
                    .add_enabled(succeeded, egui::Button::new("Download"))
                    .clicked();
                copy = ui
                    .add_enabled(succeeded, egui::Button::new("Copy"))
                    .clicked();
                reset = ui
                    .add_enabled(status != WorkflowStatus::Idle, egui::Button::new("Reset"))
                    .clicked();
                ui.separator();
                ui.weak(status.label());
                if loading {
                    ui.add(egui::Spinner::new());
                    ui.weak("Loading image...");
                }
            });
            ui.separator();

            if let Some(message) = &error_message {
                egui::Frame::NONE
                    .fill(ui.visuals().error_fg_color.gamma_multiply(0.15))
                    .corner_radius(8.0)
                    .inner_margin(egui::Margin::symmetric(12, 8))
                    .show(ui, |ui| {
                        ui.colored_label(ui.visuals().error_fg_color, message.as_str());
                    });
                ui.add_space(6.0);
            }

            if status == WorkflowStatus::Idle {
                ui.centered_and_justified(|ui| {
                    ui.label(format!(
                        "Choose or drop an image ({}; max {})",
                        IMAGE_EXTENSIONS.join(", ").to_uppercase(),
                        human_readable_bytes(MAX_IMAGE_BYTES as u64)
                    ));
                });
                return;
            }

            ui.columns(2, |columns| {
                columns[0].strong("Original");
                if let Some(label) = &selected_label {
                    columns[0].weak(label.as_str());
                }
                show_preview(&mut columns[0], self.previews.original());

                columns[1].strong("Result");
                match status {
                    WorkflowStatus::Processing => {
                        columns[1].horizontal(|ui| {
                            ui.add(egui::Spinner::new());
                            ui.label("Removing background...");
                        });
                    }
                    WorkflowStatus::Succeeded => show_preview(&mut columns[1], self.previews.result()),
                    _ => {
                        columns[1].weak("No result yet");
                    }
                }
            });
        });

        if choose {
            self.choose_image();
        }
        if submit {
            self.submit();
        }
        if download {
            self.download();
        }
        if copy {
            self.copy_result();
        }
        if reset {
            self.reset();
        }
    }
}

fn show_preview(ui: &mut egui::Ui, preview: Option<&Preview>) {
    match preview {
        Some(Preview::Ready(preview)) => {
            let max = ui.available_size().min(preview.size);
            ui.add(egui::Image::new(&preview.texture).max_size(max).maintain_aspect_ratio(true));
        }
        Some(Preview::DecodeFailed(reason)) => {
            ui.weak("Preview unavailable").on_hover_text(reason.as_str());
        }
        None => {
            ui.add(egui::Spinner::new());
        }
    }
}

pub fn human_readable_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else if value.fract() == 0.0 {
        format!("{} {}", value as u64, UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

impl eframe::App for BgRemoverApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();
        self.handle_dropped_files(ctx);
        self.previews.sync(ctx, self.gate.workflow());

        self.show_top_bar(ctx);
        self.show_status_bar(ctx);
        match self.gate.view() {
            GateView::Loading => self.show_loading_screen(ctx),
            GateView::SignIn => self.show_sign_in_screen(ctx),
            GateView::Workflow => self.show_workflow_screen(ctx),
        }

        let busy = self.sign_in.pending
            || self
                .gate
                .workflow()
                .is_some_and(ImageWorkflow::is_processing);
        let interval = if busy { 16 } else { 100 };
        ctx.request_repaint_after(std::time::Duration::from_millis(interval));
    }
}

impl Drop for BgRemoverApp {
    fn drop(&mut self) {
        self.previews.clear();
        self.gate.unmount();
    }
}
