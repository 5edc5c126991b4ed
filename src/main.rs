// src/main.rs
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]
mod engine;
mod gui;
mod serial;
mod telemetry;
mod types;
use eframe::egui;
use log::warn;
use telemetry::MonitorConfig;
// 入口函数
fn main() -> eframe::Result<()> {
    env_logger::init();
    let config = MonitorConfig::load_or_default().unwrap_or_else(|e| {
        warn!("{e:#}; using default settings");
        MonitorConfig::default()
    });
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 800.0])
        .with_min_inner_size([900.0, 560.0])
        .with_title("kvscope");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "kvscope",
        options,
        Box::new(move |_cc| Box::new(gui::MonitorApp::new(config))),
    )
}
