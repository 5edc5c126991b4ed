use serde::{Deserialize, Serialize};

use crate::telemetry::metrics::PixelMetrics;
use crate::telemetry::view::MonitorView;

pub const DEFAULT_MIN_VISIBLE_SPAN: f64 = 50.0;
pub const DEFAULT_AUTO_EXPAND_PAD_PX: f64 = 12.0;

/// Visible value-axis interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}
impl AxisRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}
impl Default for AxisRange {
    /// Unscaled view before the first automatic pass.
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Smallest automatic span; keeps small-range signals off the pixel grid.
    pub min_visible_span: f64,
    /// Headroom above the data maximum, in pixels.
    pub auto_expand_pad_px: f64,
}
impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            min_visible_span: DEFAULT_MIN_VISIBLE_SPAN,
            auto_expand_pad_px: DEFAULT_AUTO_EXPAND_PAD_PX,
        }
    }
}

/// Value-axis policy.
///
/// Automatic passes only ever raise `max`; `min` moves only through
/// [`RangePolicy::fit`], which is the single path allowed to shrink the axis.
#[derive(Clone, Copy, Debug, Default)]
pub struct RangePolicy {
    pub config: RangeConfig,
}
impl RangePolicy {
    pub fn new(config: RangeConfig) -> Self {
        Self { config }
    }

    pub fn enforce_min_span(&self, range: AxisRange) -> AxisRange {
        if range.span() < self.config.min_visible_span {
            AxisRange::new(range.min, range.min + self.config.min_visible_span)
        } else {
            range
        }
    }

    /// Highest value the axis has to show.
    ///
    /// `data_max` is the data-driven input; `overlay_max` is what the end
    /// labels need to stay on-canvas (see `LabelPlacer::required_axis_max`).
    pub fn required_max(
        &self,
        current: AxisRange,
        data_max: f64,
        overlay_max: Option<f64>,
        metrics: &PixelMetrics,
    ) -> f64 {
        let data_required = data_max + self.config.auto_expand_pad_px * metrics.y_per_px();
        let min_span_required = current.min + self.config.min_visible_span;
        overlay_max
            .into_iter()
            .fold(data_required, f64::max)
            .max(min_span_required)
    }

    /// Grows `current` so it reaches `required_max`; never lowers anything.
    pub fn expand_up_only(&self, current: AxisRange, required_max: f64) -> AxisRange {
        let mut target = current;
        if required_max > target.max {
            target.max = required_max;
        }
        target = self.enforce_min_span(target);
        let floored = zero_floor(current.min, target.min);
        if floored != target.min {
            target = self.enforce_min_span(AxisRange::new(floored, target.max));
        }
        target
    }

    /// One automatic pass over the visible data. With nothing visible the
    /// range is returned untouched.
    pub fn auto_range(
        &self,
        current: AxisRange,
        view: &MonitorView,
        overlay_max: Option<f64>,
        metrics: &PixelMetrics,
    ) -> AxisRange {
        let Some((_, data_max)) = view.value_bounds() else {
            return current;
        };
        let required = self.required_max(current, data_max, overlay_max, metrics);
        self.expand_up_only(current, required)
    }

    /// Tight range around every visible value, padded, floored at zero for
    /// non-negative data and still at least the minimum span.
    pub fn fit(&self, view: &MonitorView, metrics: Option<&PixelMetrics>) -> Option<AxisRange> {
        let (data_min, data_max) = view.value_bounds()?;
        let pad = match metrics {
            Some(m) if m.y_per_px() > 0.0 => {
                (self.config.auto_expand_pad_px * m.y_per_px()).max(1.0)
            }
            _ => ((data_max - data_min) * 0.05).max(1.0),
        };
        let min = zero_floor(data_min, data_min - pad);
        Some(self.enforce_min_span(AxisRange::new(min, data_max + pad)))
    }
}

/// Keeps the axis out of negative territory unless `baseline` already is.
fn zero_floor(baseline: f64, target_min: f64) -> f64 {
    if target_min < 0.0 && baseline >= 0.0 {
        0.0
    } else {
        target_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::metrics::DataRect;
    use crate::telemetry::parser::KvRecord;
    use crate::telemetry::store::ChannelStore;

    fn metrics_for(range: AxisRange) -> PixelMetrics {
        PixelMetrics::new(DataRect::new((0.0, 5.0), range), 500.0, 400.0)
    }

    fn store_with(values: &[(&str, i64)], t: f64) -> ChannelStore {
        let mut store = ChannelStore::with_time_window(5.0);
        let record: KvRecord = values.iter().map(|&(k, v)| (k, v)).collect();
        store.update(&record, t);
        store
    }

    #[test]
    fn tiny_signal_gets_minimum_span() {
        let policy = RangePolicy::default();
        let store = store_with(&[("aa", 3), ("bb", 21)], 1.0);
        let view = MonitorView::build(&store);
        let current = AxisRange::default();
        let next = policy.auto_range(current, &view, None, &metrics_for(current));
        assert_eq!(next.min, 0.0);
        assert!(next.span() >= 50.0);
        assert!(next.max >= 21.0);
    }

    #[test]
    fn auto_range_is_up_only() {
        let policy = RangePolicy::default();
        let mut store = ChannelStore::with_time_window(1.0);
        let mut range = AxisRange::default();
        let mut previous_max = range.max;
        let values = [900, 600, 300, 100, 400, 1200, 1500];
        for (i, v) in values.iter().enumerate() {
            let t = 10.0 + i as f64 * 2.0;
            let record: KvRecord = [("aa", *v)].into_iter().collect();
            store.update(&record, t);
            store.prune(t);
            let view = MonitorView::build(&store);
            range = policy.auto_range(range, &view, None, &metrics_for(range));
            assert!(range.max >= previous_max);
            assert_eq!(range.min, 0.0);
            previous_max = range.max;
        }
        assert!(range.max >= 1500.0);
        // Only an explicit fit can bring the axis back down.
        let record: KvRecord = [("aa", 20)].into_iter().collect();
        store.update(&record, 30.0);
        store.prune(30.0);
        let view = MonitorView::build(&store);
        let fitted = policy.fit(&view, Some(&metrics_for(range))).unwrap();
        assert!(fitted.max < range.max);
        assert!(fitted.span() >= 50.0);
    }

    #[test]
    fn label_requirement_can_raise_the_axis() {
        let policy = RangePolicy::default();
        let current = AxisRange::new(0.0, 100.0);
        let metrics = metrics_for(current);
        let data_only = policy.required_max(current, 90.0, None, &metrics);
        let with_labels = policy.required_max(current, 90.0, Some(140.0), &metrics);
        assert_eq!(data_only, 90.0 + 12.0 * 0.25);
        assert_eq!(with_labels, 140.0);
        let next = policy.expand_up_only(current, with_labels);
        assert_eq!(next, AxisRange::new(0.0, 140.0));
    }

    #[test]
    fn expand_never_shrinks_or_moves_min() {
        let policy = RangePolicy::default();
        let current = AxisRange::new(-20.0, 500.0);
        assert_eq!(policy.expand_up_only(current, 100.0), current);
        let grown = policy.expand_up_only(current, 800.0);
        assert_eq!(grown, AxisRange::new(-20.0, 800.0));
    }

    #[test]
    fn no_data_leaves_range_alone() {
        let policy = RangePolicy::default();
        let view = MonitorView::default();
        let current = AxisRange::new(5.0, 7.0);
        assert_eq!(
            policy.auto_range(current, &view, None, &metrics_for(current)),
            current
        );
        assert!(policy.fit(&view, None).is_none());
    }

    #[test]
    fn fit_floors_at_zero_and_keeps_min_span() {
        let policy = RangePolicy::default();
        let store = store_with(&[("aa", 0), ("bb", 10)], 1.0);
        let view = MonitorView::build(&store);
        let fitted = policy.fit(&view, None).unwrap();
        assert_eq!(fitted.min, 0.0);
        assert_eq!(fitted.max, 50.0);

        let store = store_with(&[("aa", 1000), ("bb", 3000)], 1.0);
        let view = MonitorView::build(&store);
        let fitted = policy.fit(&view, None).unwrap();
        assert_eq!(fitted, AxisRange::new(900.0, 3100.0));
    }
}
