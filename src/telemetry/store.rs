use std::collections::{HashMap, VecDeque};

use crate::telemetry::parser::KvRecord;

/// Hard cap on distinct channels; later unseen keys are rejected and counted.
pub const MAX_CHANNELS: usize = 16;

/// Smallest f64 above a finite `t`.
fn next_float_up(t: f64) -> f64 {
    if t == 0.0 {
        f64::from_bits(1)
    } else if t > 0.0 {
        f64::from_bits(t.to_bits() + 1)
    } else {
        f64::from_bits(t.to_bits() - 1)
    }
}
/// Timestamp equality tolerance (0.5 ms).
pub const TS_EPS: f64 = 0.0005;
pub const MIN_TIME_WINDOW_SECS: f64 = 1.0;
pub const DEFAULT_TIME_WINDOW_SECS: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    /// Seconds, same clock as the batch timestamps.
    pub time: f64,
    pub value: i64,
}

/// One named series. Owned by [`ChannelStore`]; callers only get shared refs.
#[derive(Clone, Debug)]
pub struct Channel {
    key: String,
    samples: VecDeque<Sample>,
    enabled: bool,
    first_seen_ts: f64,
    last_ts: f64,
}
impl Channel {
    fn new(key: String, first_seen_ts: f64) -> Self {
        Self {
            key,
            samples: VecDeque::new(),
            enabled: true,
            first_seen_ts,
            last_ts: 0.0,
        }
    }
    pub fn key(&self) -> &str {
        &self.key
    }
    pub fn enabled(&self) -> bool {
        self.enabled
    }
    pub fn first_seen_ts(&self) -> f64 {
        self.first_seen_ts
    }
    pub fn last_ts(&self) -> f64 {
        self.last_ts
    }
    pub fn samples(&self) -> impl DoubleEndedIterator<Item = &Sample> + ExactSizeIterator {
        self.samples.iter()
    }
    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn push(&mut self, timestamp: f64, value: i64) -> bool {
        // Per-channel sanitation: the clock only moves forward.
        let mut t = timestamp;
        let mut stepped = false;
        if !t.is_finite() || t <= self.last_ts {
            t = self.last_ts + TS_EPS;
            // At epoch magnitudes the sum rounds down; walk up until the gap holds.
            while t - self.last_ts < TS_EPS {
                t = next_float_up(t);
            }
            stepped = true;
        }
        self.last_ts = t;
        match self.samples.back_mut() {
            Some(last) if !stepped && (t - last.time).abs() < TS_EPS => {
                // Near-simultaneous re-report: correction, not a new sample.
                *last = Sample { time: t, value };
                false
            }
            _ => {
                self.samples.push_back(Sample { time: t, value });
                true
            }
        }
    }

    fn prune(&mut self, cutoff: f64) {
        while let Some(front) = self.samples.front() {
            if front.time < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn clear_samples(&mut self) {
        self.samples.clear();
        self.last_ts = 0.0;
    }
}

/// Bounded, windowed multi-channel time-series store.
///
/// Channels keep first-seen order for their whole life; only [`ChannelStore::reset`]
/// forgets them. The store is single-owner: no interior locking.
#[derive(Clone, Debug)]
pub struct ChannelStore {
    channels: Vec<Channel>,
    index: HashMap<String, usize>,
    time_window_secs: f64,
    total_samples: u64,
    dropped_keys: u64,
}
impl Default for ChannelStore {
    fn default() -> Self {
        Self::new()
    }
}
impl ChannelStore {
    pub fn new() -> Self {
        Self {
            channels: Vec::with_capacity(MAX_CHANNELS),
            index: HashMap::with_capacity(MAX_CHANNELS),
            time_window_secs: DEFAULT_TIME_WINDOW_SECS,
            total_samples: 0,
            dropped_keys: 0,
        }
    }
    pub fn with_time_window(seconds: f64) -> Self {
        let mut store = Self::new();
        store.set_time_window(seconds);
        store
    }

    // ----- controls -----

    pub fn set_time_window(&mut self, seconds: f64) {
        // f64::max drops NaN, so a NaN window lands on the minimum.
        self.time_window_secs = seconds.max(MIN_TIME_WINDOW_SECS);
    }
    pub fn time_window(&self) -> f64 {
        self.time_window_secs
    }

    /// Clears sample data and counters; channel identity, order, enable
    /// flags and first-seen timestamps survive (manual "Refresh").
    pub fn reset_samples(&mut self) {
        for channel in &mut self.channels {
            channel.clear_samples();
        }
        self.total_samples = 0;
        self.dropped_keys = 0;
    }

    /// Forgets everything, including channel order. Used before a new connection.
    pub fn reset(&mut self) {
        self.channels.clear();
        self.index.clear();
        self.total_samples = 0;
        self.dropped_keys = 0;
    }

    // ----- channel management -----

    /// Returns whether `key` exists after the call. At capacity an unseen key
    /// is counted in the dropped-key counter and not created.
    pub fn ensure_channel(&mut self, key: &str, timestamp: f64) -> bool {
        if self.index.contains_key(key) {
            return true;
        }
        if self.channels.len() >= MAX_CHANNELS {
            self.dropped_keys += 1;
            return false;
        }
        let first_seen = if timestamp.is_finite() { timestamp } else { 0.0 };
        self.index.insert(key.to_owned(), self.channels.len());
        self.channels.push(Channel::new(key.to_owned(), first_seen));
        true
    }

    /// Reads and clears the capacity-rejection counter.
    pub fn consume_dropped_keys(&mut self) -> u64 {
        std::mem::take(&mut self.dropped_keys)
    }

    pub fn set_enabled(&mut self, key: &str, enabled: bool) {
        if let Some(&idx) = self.index.get(key) {
            self.channels[idx].enabled = enabled;
        }
    }
    pub fn set_all_enabled(&mut self, enabled: bool) {
        for channel in &mut self.channels {
            channel.enabled = enabled;
        }
    }
    /// Unknown keys read as enabled.
    pub fn is_enabled(&self, key: &str) -> bool {
        self.channel(key).map_or(true, Channel::enabled)
    }

    // ----- ingestion -----

    pub fn update(&mut self, record: &KvRecord, timestamp: f64) {
        if record.is_empty() {
            return;
        }
        for (key, value) in record.iter() {
            if !self.ensure_channel(key, timestamp) {
                continue;
            }
            if value < 0 {
                continue;
            }
            let Some(&idx) = self.index.get(key) else {
                continue;
            };
            if self.channels[idx].push(timestamp, value) {
                self.total_samples += 1;
            }
        }
    }

    /// Evicts every sample older than `now - window`. Samples exactly on the
    /// cutoff stay.
    pub fn prune(&mut self, now: f64) {
        if !now.is_finite() {
            return;
        }
        let cutoff = now - self.time_window_secs;
        for channel in &mut self.channels {
            channel.prune(cutoff);
        }
    }

    // ----- queries -----

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.key.as_str())
    }
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }
    pub fn channel(&self, key: &str) -> Option<&Channel> {
        self.index.get(key).map(|&idx| &self.channels[idx])
    }
    /// First-seen position of `key`; doubles as its color index.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }
    /// Copy of the series; empty for unknown keys.
    pub fn series(&self, key: &str) -> Vec<Sample> {
        self.channel(key)
            .map(|c| c.samples.iter().copied().collect())
            .unwrap_or_default()
    }
    pub fn latest(&self, key: &str) -> Option<Sample> {
        self.channel(key).and_then(Channel::latest)
    }
    /// Enabled channels that hold at least one sample, in first-seen order.
    pub fn enabled_channels_with_data(&self) -> impl Iterator<Item = &Channel> {
        self.channels
            .iter()
            .filter(|c| c.enabled && !c.samples.is_empty())
    }
    pub fn enabled_keys_with_data(&self) -> Vec<&str> {
        self.enabled_channels_with_data()
            .map(|c| c.key.as_str())
            .collect()
    }
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }
    pub fn enabled_count(&self) -> usize {
        self.channels.iter().filter(|c| c.enabled).count()
    }
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
    pub fn is_full(&self) -> bool {
        self.channels.len() >= MAX_CHANNELS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::parser::parse_kv_line;

    fn record(fields: &[(&str, i64)]) -> KvRecord {
        fields.iter().map(|&(k, v)| (k, v)).collect()
    }

    #[test]
    fn coalesces_re_reports_within_eps() {
        let mut store = ChannelStore::new();
        store.update(&record(&[("state", 5), ("CHG", 4179)]), 1.000);
        store.update(&record(&[("state", 5), ("CHG", 4181)]), 1.0002);
        assert_eq!(store.channel_count(), 2);
        let chg = store.series("CHG");
        assert_eq!(chg.len(), 1);
        assert_eq!(chg[0].value, 4181);
        assert_eq!(store.total_samples(), 2);
    }

    #[test]
    fn seventeenth_key_is_rejected_and_drained_once() {
        let mut store = ChannelStore::new();
        for i in 1..=16 {
            assert!(!store.is_full());
            assert!(store.ensure_channel(&format!("X{i}"), 1.0));
        }
        assert!(store.is_full());
        assert!(!store.ensure_channel("X17", 1.0));
        assert_eq!(store.channel_count(), MAX_CHANNELS);
        assert!(store.channel("X17").is_none());
        assert_eq!(store.consume_dropped_keys(), 1);
        assert_eq!(store.consume_dropped_keys(), 0);
        // Known keys stay idempotent at capacity.
        assert!(store.ensure_channel("X3", 2.0));
        assert_eq!(store.consume_dropped_keys(), 0);
    }

    #[test]
    fn dropped_count_matches_rejected_updates() {
        let mut store = ChannelStore::new();
        let line: String = (0..20)
            .map(|i| format!("k{i:02}:{i}"))
            .collect::<Vec<_>>()
            .join(",");
        store.update(&parse_kv_line(&line), 1.0);
        assert_eq!(store.channel_count(), 16);
        assert_eq!(store.consume_dropped_keys(), 4);
        assert_eq!(store.total_samples(), 16);
    }

    #[test]
    fn out_of_order_timestamps_are_stepped_forward() {
        let mut store = ChannelStore::new();
        store.update(&record(&[("a1", 1)]), 10.0);
        store.update(&record(&[("a1", 2)]), 9.0);
        store.update(&record(&[("a1", 3)]), 10.0);
        let series = store.series("a1");
        assert_eq!(series.len(), 3);
        assert!(series[1].time > 10.0);
        assert!(series[1].time - series[0].time >= TS_EPS);
        assert!(series[2].time > series[1].time);
        assert_eq!(store.total_samples(), 3);
        assert_eq!(store.channel("a1").unwrap().last_ts(), series[2].time);
    }

    #[test]
    fn stepped_gap_holds_at_epoch_scale() {
        let base = 1_760_000_000.123;
        let mut store = ChannelStore::new();
        for value in 0..3 {
            store.update(&record(&[("CHG", value)]), base);
        }
        let series = store.series("CHG");
        assert_eq!(series.len(), 3);
        for pair in series.windows(2) {
            assert!(pair[1].time > pair[0].time);
            assert!(pair[1].time - pair[0].time >= TS_EPS);
        }
    }

    #[test]
    fn next_float_up_is_strictly_greater() {
        for t in [0.0, -0.0, 1.0, -1.0, 1_760_000_000.123, -2.5e-9] {
            let up = next_float_up(t);
            assert!(up > t, "{t} -> {up}");
        }
    }

    #[test]
    fn non_finite_timestamps_are_corrected() {
        let mut store = ChannelStore::new();
        assert!(store.ensure_channel("nan", f64::NAN));
        assert_eq!(store.channel("nan").unwrap().first_seen_ts(), 0.0);
        store.update(&record(&[("nan", 4)]), 5.0);
        store.update(&record(&[("nan", 6)]), f64::NAN);
        let series = store.series("nan");
        assert_eq!(series.len(), 2);
        assert!(series[1].time > 5.0);
    }

    #[test]
    fn negative_values_are_dropped_per_field() {
        let mut store = ChannelStore::new();
        store.update(&record(&[("neg", -1), ("pos", 3)]), 1.0);
        // The key was seen, so the channel exists, but it holds no data.
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["neg", "pos"]);
        assert!(store.series("neg").is_empty());
        assert_eq!(store.series("pos").len(), 1);
        assert_eq!(store.enabled_keys_with_data(), vec!["pos"]);
    }

    #[test]
    fn empty_update_is_a_no_op() {
        let mut store = ChannelStore::new();
        store.update(&KvRecord::new(), 1.0);
        assert_eq!(store.channel_count(), 0);
        assert_eq!(store.total_samples(), 0);
    }

    #[test]
    fn prune_keeps_samples_on_the_cutoff() {
        let mut store = ChannelStore::with_time_window(2.0);
        for (i, t) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            store.update(&record(&[("v1", i as i64)]), *t);
        }
        store.prune(5.0);
        let times: Vec<f64> = store.series("v1").iter().map(|s| s.time).collect();
        assert_eq!(times, vec![3.0, 4.0]);
        for s in store.series("v1") {
            assert!(s.time >= 5.0 - store.time_window());
        }
        store.prune(f64::NAN);
        assert_eq!(store.series("v1").len(), 2);
    }

    #[test]
    fn order_is_stable_across_updates_and_toggles() {
        let mut store = ChannelStore::new();
        store.update(&record(&[("bb", 1), ("aa", 1)]), 1.0);
        store.update(&record(&[("cc", 1), ("aa", 2)]), 2.0);
        store.set_enabled("bb", false);
        store.update(&record(&[("bb", 4)]), 3.0);
        store.reset_samples();
        store.update(&record(&[("cc", 9)]), 4.0);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["bb", "aa", "cc"]);
        assert!(!store.is_enabled("bb"));
        assert_eq!(store.channel("bb").unwrap().first_seen_ts(), 1.0);
        store.reset();
        store.update(&record(&[("cc", 1)]), 5.0);
        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["cc"]);
    }

    #[test]
    fn reset_samples_clears_counters_and_last_ts() {
        let mut store = ChannelStore::new();
        store.update(&record(&[("aa", 1)]), 100.0);
        for i in 0..16 {
            store.ensure_channel(&format!("f{i}"), 100.0);
        }
        store.reset_samples();
        assert_eq!(store.total_samples(), 0);
        assert_eq!(store.consume_dropped_keys(), 0);
        assert_eq!(store.channel("aa").unwrap().last_ts(), 0.0);
        // An earlier clock is accepted again after the reset.
        store.update(&record(&[("aa", 2)]), 50.0);
        assert_eq!(store.series("aa")[0].time, 50.0);
    }

    #[test]
    fn unknown_keys_get_safe_defaults() {
        let mut store = ChannelStore::new();
        assert!(store.is_enabled("ghost"));
        assert!(store.series("ghost").is_empty());
        store.set_enabled("ghost", false);
        assert!(store.channel("ghost").is_none());
    }

    #[test]
    fn enabled_count_and_bulk_toggle() {
        let mut store = ChannelStore::new();
        store.update(&record(&[("aa", 1), ("bb", 2), ("cc", 3)]), 1.0);
        store.set_enabled("bb", false);
        assert_eq!(store.enabled_count(), 2);
        store.set_all_enabled(false);
        assert_eq!(store.enabled_count(), 0);
        assert!(store.enabled_keys_with_data().is_empty());
        store.set_all_enabled(true);
        assert_eq!(store.enabled_keys_with_data(), vec!["aa", "bb", "cc"]);
    }

    #[test]
    fn time_window_is_clamped() {
        let mut store = ChannelStore::new();
        store.set_time_window(0.1);
        assert_eq!(store.time_window(), MIN_TIME_WINDOW_SECS);
        store.set_time_window(f64::NAN);
        assert_eq!(store.time_window(), MIN_TIME_WINDOW_SECS);
        store.set_time_window(30.0);
        assert_eq!(store.time_window(), 30.0);
    }
}
