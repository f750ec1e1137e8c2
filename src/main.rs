mod app;
mod config;
mod mirror;
mod theme;

use app::MirrorGoApp;

fn main() -> eframe::Result<()> {
    let native_options = eframe::NativeOptions {
        initial_window_size: Some(eframe::egui::Vec2::new(850.0, 680.0)),
        ..Default::default()
    };

    eframe::run_native(
        "MirrorGo",
        native_options,
        Box::new(|cc| Box::new(MirrorGoApp::new(cc))),
    )
}
