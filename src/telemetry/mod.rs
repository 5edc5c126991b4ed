// src/telemetry/mod.rs
// 声明同级目录下的子模块文件
pub mod config;
pub mod error;
pub mod labels;
pub mod mailbox;
pub mod metrics;
pub mod palette;
pub mod parser;
pub mod pipeline;
pub mod plot;
pub mod range;
pub mod source;
pub mod store;
pub mod view;
// 公开导出这些模块里的结构体，方便外部调用
pub use config::{MonitorConfig, ParityMode, SerialSettings, TimeWindow};
pub use error::MonitorError;
pub use labels::LabelPlacer;
pub use metrics::{DataRect, PixelMetrics};
pub use palette::{color_for_index, SeriesColor};
pub use pipeline::{IngestReport, IngestionPipeline};
pub use plot::{render_snapshot_png, PlotStyle};
pub use range::{AxisRange, RangePolicy};
pub use source::{LineSource, SimulatedDevice};
pub use store::{ChannelStore, MAX_CHANNELS};
pub use view::MonitorView;

/// Wall-clock seconds since the Unix epoch; the time base of every batch.
pub fn wall_clock_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
