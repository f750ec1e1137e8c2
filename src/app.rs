use eframe::egui;
use rfd::FileDialog;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::config::SyncConfig;
use crate::mirror::{self, LogEvent, MirrorHandle, NameGuard, Tag};
use crate::theme;

pub struct MirrorGoApp {
    config: SyncConfig,
    log: Vec<LogEvent>,
    events_tx: Sender<LogEvent>,
    events_rx: Receiver<LogEvent>,
    job: Option<MirrorHandle>,
    confirm_pending: bool,
}

impl MirrorGoApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let config = SyncConfig::load();
        theme::apply(&cc.egui_ctx, config.theme);

        let mut app = Self {
            config,
            log: Vec::new(),
            events_tx,
            events_rx,
            job: None,
            confirm_pending: false,
        };
        app.push(Tag::Init, "MirrorGo ready.");
        if !app.config.src.is_empty() || !app.config.dst.is_empty() {
            app.push(Tag::Config, "Loaded saved paths from config.");
        }
        app
    }

    fn push(&mut self, tag: Tag, message: impl Into<String>) {
        self.log.push(LogEvent::new(tag, message));
    }

    fn save_config(&mut self) {
        if let Err(err) = self.config.save() {
            self.push(Tag::Error, format!("Failed to save config: {err}"));
        }
    }

    fn toggle_monitoring(&mut self) {
        if let Some(job) = self.job.take() {
            job.stop();
            return;
        }

        if self.config.src.is_empty() || self.config.dst.is_empty() {
            self.push(Tag::Error, "Select both a source and a destination file.");
            return;
        }

        match mirror::name_guard(Path::new(&self.config.src), Path::new(&self.config.dst)) {
            NameGuard::Match => self.begin(),
            NameGuard::NamesDiffer => self.confirm_pending = true,
            NameGuard::ExtensionsDiffer => {
                self.push(Tag::Error, "Extension mismatch, refusing to start.");
            }
        }
    }

    fn begin(&mut self) {
        match mirror::start(
            Path::new(&self.config.src),
            Path::new(&self.config.dst),
            self.events_tx.clone(),
        ) {
            Ok(handle) => self.job = Some(handle),
            Err(err) => self.push(Tag::Error, err.to_string()),
        }
    }

    fn pick_path(&mut self, source: bool) {
        if let Some(path) = FileDialog::new().pick_file() {
            let path = path.display().to_string();
            if source {
                self.config.src = path.clone();
                self.push(Tag::Path, format!("Source set to {path}"));
            } else {
                self.config.dst = path.clone();
                self.push(Tag::Path, format!("Destination set to {path}"));
            }
            self.save_config();
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.log.push(event);
        }
    }

    fn path_row(&mut self, ui: &mut egui::Ui, label: &str, source: bool) {
        ui.horizontal(|ui| {
            ui.label(label);
            let idle = self.job.is_none();
            let field = if source {
                &mut self.config.src
            } else {
                &mut self.config.dst
            };
            let changed = ui
                .add_enabled(idle, egui::TextEdit::singleline(field))
                .changed();
            if changed {
                self.save_config();
            }
            if ui.add_enabled(idle, egui::Button::new("Browse")).clicked() {
                self.pick_path(source);
            }
        });
    }

    fn confirm_dialog(&mut self, ctx: &egui::Context) {
        if !self.confirm_pending {
            return;
        }
        egui::Window::new("Confirm")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("File names differ. Mirror anyway?");
                ui.horizontal(|ui| {
                    if ui.button("Yes").clicked() {
                        self.confirm_pending = false;
                        self.begin();
                    }
                    if ui.button("No").clicked() {
                        self.confirm_pending = false;
                    }
                });
            });
    }
}

impl eframe::App for MirrorGoApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("MirrorGo File Mirror");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let mut selected = self.config.theme;
                    egui::ComboBox::from_label("Theme")
                        .selected_text(theme::THEME_NAMES[selected.min(2)])
                        .show_ui(ui, |ui| {
                            for (index, name) in theme::THEME_NAMES.iter().enumerate() {
                                ui.selectable_value(&mut selected, index, *name);
                            }
                        });
                    if selected != self.config.theme {
                        self.config.theme = selected;
                        theme::apply(ctx, selected);
                        self.save_config();
                        self.push(
                            Tag::Config,
                            format!("Theme set to {}", theme::THEME_NAMES[selected]),
                        );
                    }
                });
            });
            ui.add_space(10.0);

            self.path_row(ui, "Source file:", true);
            self.path_row(ui, "Destination file:", false);
            ui.add_space(10.0);

            ui.with_layout(egui::Layout::bottom_up(egui::Align::LEFT), |ui| {
                ui.horizontal(|ui| {
                    let (status, color) = if self.job.is_some() {
                        ("● Monitoring", egui::Color32::from_rgb(40, 167, 69))
                    } else {
                        ("● Ready", egui::Color32::GRAY)
                    };
                    ui.colored_label(color, status);
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let label = if self.job.is_some() {
                            "Stop Sync"
                        } else {
                            "Start Sync"
                        };
                        if ui.button(label).clicked() {
                            self.toggle_monitoring();
                        }
                    });
                });
                ui.add_space(5.0);

                ui.group(|ui| {
                    ui.set_min_height(ui.available_height());
                    ui.label("Logs");
                    egui::ScrollArea::vertical()
                        .stick_to_bottom(true)
                        .show(ui, |ui| {
                            for event in &self.log {
                                ui.monospace(event.render());
                            }
                        });
                });
            });
        });

        self.confirm_dialog(ctx);

        // Keep draining worker events even when no input arrives.
        ctx.request_repaint();
    }
}
