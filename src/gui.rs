// src/gui.rs
use crate::engine;
use crate::serial::PortInfo;
use crate::telemetry::{
    color_for_index, render_snapshot_png, wall_clock_secs, AxisRange, ChannelStore, DataRect,
    IngestReport, IngestionPipeline, LabelPlacer, MonitorConfig, MonitorView, ParityMode,
    PixelMetrics, PlotStyle, RangePolicy, SeriesColor, SerialSettings, TimeWindow, MAX_CHANNELS,
};
use crate::telemetry::parser::{FORMAT_EXAMPLE, FORMAT_HELP};
use crate::types::*;
use anyhow::Context;
use eframe::egui;
use egui::{Align2, Color32, RichText};
use egui_plot::{Line, Plot, PlotBounds, PlotPoint, PlotPoints, Text, VLine};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const AUTO_REFRESH_CHOICES: [Option<u64>; 5] = [None, Some(5), Some(10), Some(30), Some(60)];
// 首帧之前还不知道绘图区大小
const FALLBACK_PLOT_PX: (f64, f64) = (800.0, 400.0);

fn to_color32(color: SeriesColor) -> Color32 {
    Color32::from_rgb(color.0, color.1, color.2)
}

pub struct MonitorApp {
    config: MonitorConfig,

    // 数据与坐标轴
    pipeline: IngestionPipeline,
    policy: RangePolicy,
    placer: LabelPlacer,
    y_range: AxisRange,
    plot_px: Option<(f64, f64)>,
    /// Push `y_range` into a frozen plot on the next frame.
    force_bounds: bool,
    overlay: bool,
    show_help: bool,
    /// Copy of the store taken when Snapshot was pressed.
    frozen: Option<ChannelStore>,
    fit_until: Option<Instant>,
    auto_refresh: Option<u64>,
    last_refresh: Instant,
    last_flush: Instant,

    // 连接状态
    connection_mode: ConnectionMode,
    settings: SerialSettings,
    ports: Vec<PortInfo>,
    is_connected: bool,
    status_text: String,
    warning: Option<(String, Instant)>,
    log_messages: Vec<String>,

    // 通讯管道
    rx: Receiver<MonitorMessage>,
    tx_cmd: Sender<GuiCommand>,
    engine: Option<JoinHandle<()>>,
}

impl MonitorApp {
    pub fn new(config: MonitorConfig) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();

        // 启动后台读取线程
        let engine = engine::spawn_thread(tx, rx_cmd, config.clone());

        Self {
            pipeline: IngestionPipeline::new(config.time_window().seconds, config.max_pending_lines),
            policy: RangePolicy::new(config.range),
            placer: LabelPlacer::new(config.labels),
            y_range: AxisRange::default(),
            plot_px: None,
            force_bounds: false,
            overlay: true,
            show_help: false,
            frozen: None,
            fit_until: None,
            auto_refresh: None,
            last_refresh: Instant::now(),
            last_flush: Instant::now(),
            connection_mode: ConnectionMode::Hardware,
            settings: config.serial.clone(),
            ports: Vec::new(),
            is_connected: false,
            status_text: "COM: Disconnected".to_owned(),
            warning: None,
            log_messages: vec!["kvscope ready.".to_owned()],
            rx,
            tx_cmd,
            engine: Some(engine),
            config,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    fn warn_status(&mut self, msg: String, secs: u64) {
        warn!("{msg}");
        self.warning = Some((msg, Instant::now() + Duration::from_secs(secs)));
    }

    fn display_store(&self) -> &ChannelStore {
        self.frozen.as_ref().unwrap_or_else(|| self.pipeline.store())
    }

    fn metrics(&self, x_max: f64, y: AxisRange) -> PixelMetrics {
        let (w, h) = self.plot_px.unwrap_or(FALLBACK_PLOT_PX);
        PixelMetrics::new(DataRect::new((0.0, x_max), y), w, h)
    }

    // ============================================================
    // 消息与数据
    // ============================================================
    fn drain_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                MonitorMessage::Log(s) => self.log(&s),
                MonitorMessage::Status(connected, text) => {
                    if connected && !self.is_connected {
                        // 新连接：清空所有通道
                        self.pipeline.reset();
                        self.y_range = AxisRange::default();
                        self.frozen = None;
                    }
                    if !connected && self.is_connected {
                        self.pipeline.discard_pending();
                        self.auto_refresh = None;
                    }
                    self.is_connected = connected;
                    self.log(&text);
                    self.status_text = text;
                }
                MonitorMessage::Lines { lines, now } => self.pipeline.offer(lines, now),
                MonitorMessage::Ports(ports) => self.on_ports(ports),
                MonitorMessage::DeviceLost(port) => {
                    self.is_connected = false;
                    self.auto_refresh = None;
                    self.pipeline.discard_pending();
                    self.status_text = "COM: disconnected (device removed)".to_owned();
                    self.log(&format!("{port} removed"));
                    self.warn_status("COM port removed while connected".to_owned(), 5);
                }
                MonitorMessage::RxOverflow(bytes) => self.warn_status(
                    format!("Input overflow: dropped {bytes} bytes without newline"),
                    3,
                ),
            }
        }
    }

    fn on_ports(&mut self, ports: Vec<PortInfo>) {
        if !self.is_connected && !ports.iter().any(|p| p.name == self.settings.port) {
            self.settings.port = ports.first().map(|p| p.name.clone()).unwrap_or_default();
        }
        self.ports = ports;
    }

    fn flush(&mut self) {
        let Some(report) = self.pipeline.flush(wall_clock_secs()) else {
            return;
        };
        self.on_report(&report);
        self.refresh_range();
    }

    fn on_report(&mut self, report: &IngestReport) {
        if report.dropped_keys > 0 {
            self.warn_status(
                format!(
                    "Channel limit reached (max {MAX_CHANNELS}), ignored {} new keys",
                    report.dropped_keys
                ),
                5,
            );
        }
        if report.dropped_lines > 0 {
            self.warn_status(
                format!("Input overrun: dropped {} lines", report.dropped_lines),
                3,
            );
        }
    }

    /// One automatic range pass. Frozen plots keep whatever the user set.
    fn refresh_range(&mut self) {
        if self.frozen.is_some() {
            return;
        }
        let store = self.pipeline.store();
        let view = MonitorView::build(store);
        let metrics = self.metrics(view.window_secs, self.y_range);
        let overlay_max = if self.overlay {
            self.placer.required_axis_max(store, &metrics)
        } else {
            None
        };
        let mut range = self.policy.auto_range(self.y_range, &view, overlay_max, &metrics);
        if self.fit_until.is_some_and(|t| Instant::now() < t) {
            if let Some(fit) = self.policy.fit(&view, Some(&metrics)) {
                range = fit;
            }
        } else {
            self.fit_until = None;
        }
        self.y_range = range;
    }

    fn fit(&mut self) {
        let store = self.display_store();
        let view = MonitorView::build(store);
        let metrics = self.metrics(view.window_secs, self.y_range);
        if let Some(range) = self.policy.fit(&view, Some(&metrics)) {
            self.y_range = range;
            self.force_bounds = true;
        }
    }

    fn on_channels_changed(&mut self) {
        let now = wall_clock_secs();
        self.pipeline.store_mut().prune(now);
        self.fit_until = Some(Instant::now() + self.config.fit_window());
        self.refresh_range();
    }

    fn set_time_window(&mut self, seconds: f64) {
        let now = wall_clock_secs();
        let store = self.pipeline.store_mut();
        store.set_time_window(TimeWindow::new(seconds).seconds);
        store.prune(now);
        self.refresh_range();
    }

    fn refresh_samples(&mut self) {
        self.pipeline.reset_samples();
        self.last_refresh = Instant::now();
        info!("samples cleared");
    }

    fn toggle_snapshot(&mut self) {
        if self.frozen.take().is_none() {
            self.frozen = Some(self.pipeline.store().clone());
        } else {
            self.refresh_range();
        }
    }

    fn export_png(&self) -> anyhow::Result<PathBuf> {
        let placer = self.overlay.then_some(&self.placer);
        let png = render_snapshot_png(self.display_store(), self.y_range, placer, &PlotStyle::default())?;
        let path = PathBuf::from(format!("kvscope-{}.png", wall_clock_secs() as u64));
        std::fs::write(&path, png).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    // ============================================================
    // 界面
    // ============================================================
    fn connection_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.selectable_value(&mut self.connection_mode, ConnectionMode::Hardware, "COM");
            ui.selectable_value(&mut self.connection_mode, ConnectionMode::Simulation, "SIM");
        });

        ui.add_enabled_ui(!self.is_connected, |ui| {
            ui.horizontal(|ui| {
                let selected = if self.settings.port.is_empty() {
                    "(no port)".to_owned()
                } else {
                    self.settings.port.clone()
                };
                egui::ComboBox::from_id_source("port")
                    .selected_text(selected)
                    .show_ui(ui, |ui| {
                        for port in &self.ports {
                            ui.selectable_value(&mut self.settings.port, port.name.clone(), port.display());
                        }
                    });
                if ui.button("Scan").clicked() {
                    self.tx_cmd.send(GuiCommand::ScanPorts).ok();
                }
            });
            egui::Grid::new("serial_settings").num_columns(2).show(ui, |ui| {
                ui.label("Baud");
                ui.horizontal(|ui| {
                    egui::ComboBox::from_id_source("baud")
                        .selected_text(self.settings.baud_rate.to_string())
                        .show_ui(ui, |ui| {
                            for baud in SerialSettings::BAUD_RATES {
                                ui.selectable_value(&mut self.settings.baud_rate, baud, baud.to_string());
                            }
                        });
                    ui.add(egui::DragValue::new(&mut self.settings.baud_rate).clamp_range(0..=4_000_000));
                });
                ui.end_row();

                ui.label("Data bits");
                egui::ComboBox::from_id_source("data_bits")
                    .selected_text(self.settings.data_bits.to_string())
                    .show_ui(ui, |ui| {
                        for bits in SerialSettings::DATA_BITS {
                            ui.selectable_value(&mut self.settings.data_bits, bits, bits.to_string());
                        }
                    });
                ui.end_row();

                ui.label("Parity");
                egui::ComboBox::from_id_source("parity")
                    .selected_text(self.settings.parity.label())
                    .show_ui(ui, |ui| {
                        for parity in ParityMode::ALL {
                            ui.selectable_value(&mut self.settings.parity, parity, parity.label());
                        }
                    });
                ui.end_row();

                ui.label("Stop bits");
                egui::ComboBox::from_id_source("stop_bits")
                    .selected_text(self.settings.stop_bits.clone())
                    .show_ui(ui, |ui| {
                        for bits in SerialSettings::STOP_BITS {
                            ui.selectable_value(&mut self.settings.stop_bits, bits.to_owned(), bits);
                        }
                    });
                ui.end_row();
            });
        });

        let btn_txt = if self.is_connected { "DISCONNECT" } else { "CONNECT" };
        if ui.button(btn_txt).clicked() {
            let cmd = if self.is_connected {
                GuiCommand::Disconnect
            } else {
                GuiCommand::Connect(self.connection_mode, self.settings.clone())
            };
            self.tx_cmd.send(cmd).ok();
        }
    }

    fn view_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Refresh").clicked() {
                self.refresh_samples();
            }
            ui.label("Auto");
            let label = |choice: Option<u64>| match choice {
                Some(s) => format!("{s} s"),
                None => "Off".to_owned(),
            };
            egui::ComboBox::from_id_source("auto_refresh")
                .selected_text(label(self.auto_refresh))
                .show_ui(ui, |ui| {
                    for choice in AUTO_REFRESH_CHOICES {
                        if ui
                            .selectable_value(&mut self.auto_refresh, choice, label(choice))
                            .clicked()
                        {
                            self.last_refresh = Instant::now();
                        }
                    }
                });
        });
        ui.horizontal(|ui| {
            ui.label("Window");
            let current = self.pipeline.store().time_window();
            let mut picked = None;
            egui::ComboBox::from_id_source("time_window")
                .selected_text(format!("{current} s"))
                .show_ui(ui, |ui| {
                    for preset in TimeWindow::PRESETS {
                        if ui
                            .selectable_label(current == preset, format!("{preset} s"))
                            .clicked()
                        {
                            picked = Some(preset);
                        }
                    }
                });
            if let Some(seconds) = picked {
                self.set_time_window(seconds);
            }
        });
        ui.horizontal(|ui| {
            if ui.button("Fit").clicked() {
                self.fit();
            }
            let snap_txt = if self.frozen.is_some() { "Live" } else { "Snapshot" };
            if ui.selectable_label(self.frozen.is_some(), snap_txt).clicked() {
                self.toggle_snapshot();
            }
            // 只影响标签绘制，不触发坐标轴重新计算
            ui.toggle_value(&mut self.overlay, "Overlay");
            if ui.button("Export PNG").clicked() {
                match self.export_png() {
                    Ok(path) => self.log(&format!("saved {}", path.display())),
                    Err(e) => self.warn_status(format!("Export failed: {e:#}"), 5),
                }
            }
            ui.toggle_value(&mut self.show_help, "Help");
        });
    }

    fn channel_panel(&mut self, ui: &mut egui::Ui) {
        let rows: Vec<(String, bool, Option<i64>, SeriesColor)> = self
            .pipeline
            .store()
            .channels()
            .enumerate()
            .map(|(i, c)| {
                (c.key().to_owned(), c.enabled(), c.latest().map(|s| s.value), color_for_index(i))
            })
            .collect();

        let mut changed = false;
        ui.horizontal(|ui| {
            let detected = RichText::new(format!("Detected: {}/{MAX_CHANNELS}", rows.len()));
            // 通道已满时新 key 会被丢弃
            if self.pipeline.store().is_full() {
                ui.label(detected.color(Color32::YELLOW))
                    .on_hover_text("Channel limit reached; new keys are dropped");
            } else {
                ui.label(detected);
            }
            if ui.small_button("All").clicked() {
                self.pipeline.store_mut().set_all_enabled(true);
                changed = true;
            }
            if ui.small_button("None").clicked() {
                self.pipeline.store_mut().set_all_enabled(false);
                changed = true;
            }
        });
        egui::ScrollArea::vertical().max_height(320.0).show(ui, |ui| {
            for (key, mut enabled, latest, color) in rows {
                let text = match latest {
                    Some(value) => format!("{key}: {value}"),
                    None => key.clone(),
                };
                if ui
                    .checkbox(&mut enabled, RichText::new(text).color(to_color32(color)))
                    .changed()
                {
                    self.pipeline.store_mut().set_enabled(&key, enabled);
                    changed = true;
                }
            }
        });
        if changed {
            self.on_channels_changed();
        }
    }

    fn draw_plot(&mut self, ui: &mut egui::Ui) {
        let live = self.frozen.is_none();
        let set_bounds = live || std::mem::take(&mut self.force_bounds);
        let store = self.display_store();
        let view = MonitorView::build(store);
        let window = view.window_secs;
        let y_range = self.y_range;
        let placer = self.overlay.then_some(self.placer);
        let plot_px = self.plot_px.unwrap_or(FALLBACK_PLOT_PX);

        let response = Plot::new("monitor_plot")
            .allow_drag(!live)
            .allow_zoom(!live)
            .allow_scroll(!live)
            .allow_boxed_zoom(!live)
            .allow_double_click_reset(!live)
            .x_axis_label("Time (s)")
            .show(ui, |plot_ui| {
                if set_bounds {
                    plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                        [0.0, y_range.min],
                        [window, y_range.max],
                    ));
                }
                for channel in &view.channels {
                    plot_ui.line(
                        Line::new(PlotPoints::new(channel.step_points.clone()))
                            .name(&channel.key)
                            .color(to_color32(channel.color))
                            .width(2.0),
                    );
                }
                if let Some(placer) = placer {
                    // 标签按当前可见范围排布，冻结时跟随用户缩放
                    let bounds = plot_ui.plot_bounds();
                    let metrics = PixelMetrics::new(
                        DataRect::new(
                            (bounds.min()[0], bounds.max()[0]),
                            AxisRange::new(bounds.min()[1], bounds.max()[1]),
                        ),
                        plot_px.0,
                        plot_px.1,
                    );
                    for label in placer.place(store, &metrics) {
                        plot_ui.text(
                            Text::new(
                                PlotPoint::new(label.x, label.y),
                                RichText::new(label.text).color(to_color32(label.color)),
                            )
                            .anchor(Align2::RIGHT_CENTER),
                        );
                    }
                }
                if live {
                    return None;
                }
                let readout = plot_ui
                    .pointer_coordinate()
                    .and_then(|p| view.hover_readout(p.x))?;
                plot_ui.vline(VLine::new(readout.time).color(Color32::GRAY));
                Some(readout)
            });

        let frame = response.transform.frame();
        self.plot_px = Some((frame.width() as f64, frame.height() as f64));

        if let Some(readout) = response.inner {
            ui.horizontal_wrapped(|ui| {
                ui.label(format!("t = {:.3} s", readout.time));
                for (key, color, value) in readout.entries {
                    ui.label(RichText::new(format!("{key}: {value}")).color(to_color32(color)));
                }
            });
        }
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. 消息处理
        self.drain_messages();

        // 2. 定时刷新
        if self.last_flush.elapsed() >= self.config.ui_update_interval() {
            self.last_flush = Instant::now();
            self.flush();
        }
        if let (true, Some(secs)) = (self.is_connected, self.auto_refresh) {
            if self.last_refresh.elapsed() >= Duration::from_secs(secs) {
                self.refresh_samples();
            }
        }
        if self.warning.as_ref().is_some_and(|(_, until)| Instant::now() >= *until) {
            self.warning = None;
        }

        // 3. UI 绘制
        let mut visuals = egui::Visuals::dark();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(10, 10, 15);
        ctx.set_visuals(visuals);

        egui::Window::new("How to Use")
            .open(&mut self.show_help)
            .default_width(520.0)
            .show(ctx, |ui| {
                ui.label("kvscope plots integer fields from device lines in real time.");
                ui.separator();
                ui.monospace(FORMAT_HELP);
                ui.add_space(6.0);
                ui.label("Example:");
                ui.monospace(FORMAT_EXAMPLE);
            });

        egui::SidePanel::left("L").min_width(280.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("kvscope");
            ui.label("Serial key:value monitor");
            ui.separator();
            self.connection_panel(ui);
            ui.separator();
            self.view_controls(ui);
            ui.separator();
            self.channel_panel(ui);
            ui.separator();
            egui::ScrollArea::vertical()
                .id_source("log")
                .max_height(120.0)
                .show(ui, |ui| {
                    for m in &self.log_messages {
                        ui.monospace(m);
                    }
                });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(&self.status_text);
                ui.separator();
                let store = self.pipeline.store();
                ui.label(format!(
                    "Samples: {} | CH: {}",
                    store.total_samples(),
                    store.enabled_count()
                ));
                if let Some((msg, _)) = &self.warning {
                    ui.separator();
                    ui.label(RichText::new(msg).color(Color32::YELLOW));
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.frozen.is_some() {
                ui.label(RichText::new("Snapshot: drag / scroll to inspect").color(Color32::YELLOW));
            }
            self.draw_plot(ui);
        });

        ctx.request_repaint_after(self.config.ui_update_interval());
    }
}

impl Drop for MonitorApp {
    fn drop(&mut self) {
        self.tx_cmd.send(GuiCommand::Shutdown).ok();
        if let Some(handle) = self.engine.take() {
            handle.join().ok();
        }
    }
}
