use serde::{Deserialize, Serialize};

use crate::telemetry::metrics::PixelMetrics;
use crate::telemetry::palette::{color_for_index, SeriesColor, UNKNOWN_COLOR};
use crate::telemetry::store::ChannelStore;

/// Pixel geometry of the end-of-series labels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Horizontal gap left of a colliding label.
    pub gap_px: f64,
    /// Two labels closer than this (screen y) collide.
    pub y_threshold_px: f64,
    pub x_margin_px: f64,
    /// Lift above the series' last point.
    pub y_offset_px: f64,
    pub safe_margin_px: f64,
    /// Extra headroom asked from the range policy so labels are not clipped.
    pub auto_expand_pad_px: f64,
    /// Width estimate per character when no font metrics are available.
    pub glyph_width_px: f64,
    pub padding_px: f64,
}
impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            gap_px: 10.0,
            y_threshold_px: 14.0,
            x_margin_px: 8.0,
            y_offset_px: 10.0,
            safe_margin_px: 8.0,
            auto_expand_pad_px: 12.0,
            glyph_width_px: 7.5,
            padding_px: 6.0,
        }
    }
}
impl LabelConfig {
    pub fn estimate_width_px(&self, text: &str) -> f64 {
        text.chars().count() as f64 * self.glyph_width_px + 2.0 * self.padding_px
    }
}

/// Where and what to draw for one channel's latest value. `(x, y)` is the
/// label's right-middle anchor in data coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct EndLabel {
    pub key: String,
    pub text: String,
    pub color: SeriesColor,
    pub x: f64,
    pub y: f64,
    /// Left edge in data coordinates.
    pub left_x: f64,
    /// Anchor y in screen pixels (origin at the top).
    pub screen_y: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LabelPlacer {
    pub config: LabelConfig,
}
impl LabelPlacer {
    pub fn new(config: LabelConfig) -> Self {
        Self { config }
    }

    pub fn place(&self, store: &ChannelStore, metrics: &PixelMetrics) -> Vec<EndLabel> {
        self.place_with(store, metrics, |text| self.config.estimate_width_px(text))
    }

    /// Lays out labels in first-seen order. A label that lands within the
    /// pixel threshold of an earlier one is pushed left of it, never up or
    /// down; the earlier channel keeps the better spot.
    pub fn place_with<F>(
        &self,
        store: &ChannelStore,
        metrics: &PixelMetrics,
        measure: F,
    ) -> Vec<EndLabel>
    where
        F: Fn(&str) -> f64,
    {
        let cfg = &self.config;
        let view = metrics.view;
        let x_per_px = metrics.x_per_px();
        let y_per_px = metrics.y_per_px();
        let base_x = view.right - cfg.x_margin_px * x_per_px;
        let low_limit = view.bottom + cfg.safe_margin_px * y_per_px;
        let high_limit = view.top - cfg.safe_margin_px * y_per_px;

        let mut placed: Vec<EndLabel> = Vec::new();
        for channel in store.enabled_channels_with_data() {
            let Some(latest) = channel.latest() else {
                continue;
            };
            let text = latest.value.to_string();
            let width = measure(&text) * x_per_px;

            let mut x = base_x;
            let mut y = latest.value as f64 + cfg.y_offset_px * y_per_px;
            if y > high_limit {
                y = high_limit;
            } else if y < low_limit {
                y = low_limit;
            }

            let screen_y = metrics.to_screen_y(y);
            // Single pass: the last collider in first-seen order sets x, so a
            // label can still land on an earlier collider that was shifted left.
            for prev in &placed {
                if (prev.screen_y - screen_y).abs() < cfg.y_threshold_px {
                    x = prev.left_x - cfg.gap_px * x_per_px;
                }
            }

            let mut left_x = x - width;
            if left_x < view.left {
                x = view.left + width + cfg.safe_margin_px * x_per_px;
                left_x = x - width;
            }
            if x > view.right {
                x = view.right - cfg.safe_margin_px * x_per_px;
                left_x = x - width;
            }

            let color = store
                .position(channel.key())
                .map(color_for_index)
                .unwrap_or(UNKNOWN_COLOR);
            placed.push(EndLabel {
                key: channel.key().to_owned(),
                text,
                color,
                x,
                y,
                left_x,
                screen_y,
            });
        }
        placed
    }

    /// Axis maximum the labels need to stay inside the plot; the label-driven
    /// input of `RangePolicy::required_max`.
    pub fn required_axis_max(&self, store: &ChannelStore, metrics: &PixelMetrics) -> Option<f64> {
        let lift = (self.config.y_offset_px + self.config.auto_expand_pad_px) * metrics.y_per_px();
        store
            .enabled_channels_with_data()
            .filter_map(|c| c.latest())
            .map(|s| s.value as f64 + lift)
            .reduce(f64::max)
    }
}
