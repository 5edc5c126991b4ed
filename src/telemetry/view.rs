use crate::telemetry::palette::{color_for_index, SeriesColor, UNKNOWN_COLOR};
use crate::telemetry::store::{Channel, ChannelStore, Sample};

/// Draw-ready data for one enabled channel.
///
/// X values are relative: each series is shifted so its newest sample sits on
/// the right edge of a `[0, window]` axis.
#[derive(Clone, Debug)]
pub struct ChannelView {
    pub key: String,
    pub color: SeriesColor,
    pub latest: Sample,
    pub min: i64,
    pub max: i64,
    /// Zero-order-hold polyline: each value is held until the next sample.
    pub step_points: Vec<[f64; 2]>,
    /// One point per sample, used for hover snapping.
    pub points: Vec<[f64; 2]>,
}

#[derive(Clone, Debug, Default)]
pub struct MonitorView {
    pub window_secs: f64,
    pub channels: Vec<ChannelView>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HoverReadout {
    pub time: f64,
    pub entries: Vec<(String, SeriesColor, i64)>,
}

impl MonitorView {
    pub fn build(store: &ChannelStore) -> Self {
        let window_secs = store.time_window();
        let channels = store
            .enabled_channels_with_data()
            .filter_map(|channel| {
                let color = store
                    .position(channel.key())
                    .map(color_for_index)
                    .unwrap_or(UNKNOWN_COLOR);
                channel_view(channel, color, window_secs)
            })
            .collect();
        Self {
            window_secs,
            channels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Lowest and highest visible value over all channels.
    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        let min = self.channels.iter().map(|c| c.min).min()?;
        let max = self.channels.iter().map(|c| c.max).max()?;
        Some((min as f64, max as f64))
    }

    /// Nearest sample of every channel at relative time `t`. The reported
    /// time snaps to the first channel's nearest sample.
    pub fn hover_readout(&self, t: f64) -> Option<HoverReadout> {
        if !(0.0..=self.window_secs).contains(&t) {
            return None;
        }
        let mut snap = None;
        let mut entries = Vec::new();
        for channel in &self.channels {
            let Some(nearest) = channel
                .points
                .iter()
                .min_by(|a, b| (a[0] - t).abs().total_cmp(&(b[0] - t).abs()))
            else {
                continue;
            };
            snap.get_or_insert(nearest[0]);
            entries.push((channel.key.clone(), channel.color, nearest[1] as i64));
        }
        snap.map(|time| HoverReadout { time, entries })
    }
}

fn channel_view(channel: &Channel, color: SeriesColor, window_secs: f64) -> Option<ChannelView> {
    let latest = channel.latest()?;
    let t_start = latest.time - window_secs;
    let visible: Vec<Sample> = channel
        .samples()
        .filter(|s| s.time >= t_start)
        .copied()
        .collect();
    let min = visible.iter().map(|s| s.value).min()?;
    let max = visible.iter().map(|s| s.value).max()?;
    let points: Vec<[f64; 2]> = visible
        .iter()
        .map(|s| [s.time - t_start, s.value as f64])
        .collect();
    Some(ChannelView {
        key: channel.key().to_owned(),
        color,
        latest,
        min,
        max,
        step_points: step_points(&points),
        points,
    })
}

/// Expands points into a stair polyline (value held until the next x).
pub fn step_points(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for (i, p) in points.iter().enumerate() {
        out.push(*p);
        if let Some(next) = points.get(i + 1) {
            out.push([next[0], p[1]]);
        }
    }
    out
}
