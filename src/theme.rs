//! Theme selection: light/dark visuals plus a best-effort OS dark-mode
//! probe for the "follow system" setting.

use eframe::egui;

pub const THEME_NAMES: [&str; 3] = ["System Default", "Light Theme", "Dark Theme"];

/// Apply the theme at `index` (0 system, 1 light, 2 dark).
pub fn apply(ctx: &egui::Context, index: usize) {
    let dark = match index {
        1 => false,
        2 => true,
        _ => system_prefers_dark(),
    };
    ctx.set_visuals(if dark {
        egui::Visuals::dark()
    } else {
        egui::Visuals::light()
    });
}

/// Windows keeps the apps-theme flag in the registry; `0` means dark. Any
/// failure to query it reads as light.
#[cfg(target_os = "windows")]
pub fn system_prefers_dark() -> bool {
    use std::process::Command;

    let output = match Command::new("reg")
        .args([
            "query",
            r"HKEY_CURRENT_USER\Software\Microsoft\Windows\CurrentVersion\Themes\Personalize",
            "/v",
            "AppsUseLightTheme",
        ])
        .output()
    {
        Ok(output) => output,
        Err(_) => return false,
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .find(|line| line.contains("AppsUseLightTheme"))
        .map(|line| line.trim().ends_with("0x0"))
        .unwrap_or(false)
}

#[cfg(not(target_os = "windows"))]
pub fn system_prefers_dark() -> bool {
    false
}
