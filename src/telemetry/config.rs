use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::telemetry::labels::LabelConfig;
use crate::telemetry::range::RangeConfig;
use crate::telemetry::store::MIN_TIME_WINDOW_SECS;
use crate::telemetry::MonitorError;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "KVSCOPE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "kvscope.json";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeWindow {
    pub seconds: f64,
}
impl TimeWindow {
    /// Choices offered by the time-window combo box.
    pub const PRESETS: [f64; 4] = [5.0, 10.0, 30.0, 60.0];

    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: seconds.max(MIN_TIME_WINDOW_SECS),
        }
    }
}
impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow { seconds: 30.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParityMode {
    None,
    Even,
    Odd,
}
impl ParityMode {
    pub const ALL: [ParityMode; 3] = [ParityMode::None, ParityMode::Even, ParityMode::Odd];

    pub fn label(self) -> &'static str {
        match self {
            ParityMode::None => "NONE",
            ParityMode::Even => "EVEN",
            ParityMode::Odd => "ODD",
        }
    }
    pub fn short(self) -> char {
        match self {
            ParityMode::None => 'N',
            ParityMode::Even => 'E',
            ParityMode::Odd => 'O',
        }
    }
}

/// Line settings for the serial device. Kept as plain values so the GUI
/// combo boxes can edit them; `validate` maps them to `serialport` types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: ParityMode,
    pub stop_bits: String,
}
impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            data_bits: 8,
            parity: ParityMode::None,
            stop_bits: "1".to_owned(),
        }
    }
}
impl SerialSettings {
    pub const BAUD_RATES: [u32; 8] = [
        9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
    ];
    pub const DATA_BITS: [u8; 4] = [5, 6, 7, 8];
    pub const STOP_BITS: [&'static str; 3] = ["1", "1.5", "2"];

    pub fn validate(
        &self,
    ) -> Result<
        (
            serialport::DataBits,
            serialport::Parity,
            serialport::StopBits,
        ),
        MonitorError,
    > {
        if self.baud_rate == 0 {
            return Err(MonitorError::InvalidBaudRate(self.baud_rate));
        }
        let data_bits = match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(MonitorError::InvalidDataBits(other)),
        };
        let parity = match self.parity {
            ParityMode::None => serialport::Parity::None,
            ParityMode::Even => serialport::Parity::Even,
            ParityMode::Odd => serialport::Parity::Odd,
        };
        // serialport only drives one or two stop bits.
        let stop_bits = match self.stop_bits.trim() {
            "1" => serialport::StopBits::One,
            "2" => serialport::StopBits::Two,
            other => return Err(MonitorError::InvalidStopBits(other.to_owned())),
        };
        Ok((data_bits, parity, stop_bits))
    }

    /// `115200,8N1` style summary for the status bar.
    pub fn summary(&self) -> String {
        format!(
            "{},{}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.short(),
            self.stop_bits
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub time_window_secs: f64,
    pub range: RangeConfig,
    pub labels: LabelConfig,
    pub read_interval_ms: u64,
    pub ui_update_ms: u64,
    pub hotplug_scan_ms: u64,
    pub max_pending_lines: usize,
    pub fit_window_ms: u64,
    pub serial: SerialSettings,
}
impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            time_window_secs: TimeWindow::default().seconds,
            range: RangeConfig::default(),
            labels: LabelConfig::default(),
            read_interval_ms: 20,
            ui_update_ms: 50,
            hotplug_scan_ms: 1_000,
            max_pending_lines: 2_000,
            fit_window_ms: 500,
            serial: SerialSettings::default(),
        }
    }
}
impl MonitorConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: MonitorConfig =
            serde_json::from_str(text).context("malformed monitor config")?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Reads `$KVSCOPE_CONFIG` if set, otherwise `kvscope.json` when present,
    /// otherwise the built-in defaults.
    pub fn load_or_default() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(&PathBuf::from(path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            Self::load(default_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn time_window(&self) -> TimeWindow {
        TimeWindow::new(self.time_window_secs)
    }
    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms.max(1))
    }
    pub fn ui_update_interval(&self) -> Duration {
        Duration::from_millis(self.ui_update_ms.max(1))
    }
    pub fn hotplug_interval(&self) -> Duration {
        Duration::from_millis(self.hotplug_scan_ms.max(1))
    }
    pub fn fit_window(&self) -> Duration {
        Duration::from_millis(self.fit_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            MonitorConfig::from_json(r#"{"time_window_secs": 10.0, "serial": {"baud_rate": 9600}}"#)
                .unwrap();
        assert_eq!(config.time_window_secs, 10.0);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(config.range.min_visible_span, 50.0);
        assert_eq!(config.max_pending_lines, 2000);
    }
    #[test]
    fn time_window_is_clamped() {
        assert_eq!(TimeWindow::new(0.2).seconds, 1.0);
        let config = MonitorConfig::from_json(r#"{"time_window_secs": -3.0}"#).unwrap();
        assert_eq!(config.time_window().seconds, 1.0);
    }
    #[test]
    fn serial_settings_validation() {
        let mut settings = SerialSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.summary(), "115200,8N1");
        settings.stop_bits = "1.5".into();
        assert!(matches!(
            settings.validate(),
            Err(MonitorError::InvalidStopBits(_))
        ));
        settings.stop_bits = "2".into();
        settings.data_bits = 9;
        assert!(matches!(
            settings.validate(),
            Err(MonitorError::InvalidDataBits(9))
        ));
        settings.data_bits = 7;
        settings.baud_rate = 0;
        assert!(matches!(
            settings.validate(),
            Err(MonitorError::InvalidBaudRate(0))
        ));
    }
    #[test]
    fn parity_round_trips_through_json() {
        let settings: SerialSettings =
            serde_json::from_str(r#"{"parity": "EVEN", "stop_bits": "2"}"#).unwrap();
        assert_eq!(settings.parity, ParityMode::Even);
        assert_eq!(settings.summary(), "115200,8E2");
    }
}
