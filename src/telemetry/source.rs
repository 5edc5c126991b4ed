use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::telemetry::MonitorError;

/// Something that yields complete text lines on demand (serial port,
/// simulated MCU, canned playback).
pub trait LineSource {
    fn next_lines(&mut self) -> Result<Vec<String>, MonitorError>;
}

/// In-memory source useful for tests and deterministic playback.
pub struct ManualSource {
    queue: VecDeque<Vec<String>>,
}
impl ManualSource {
    pub fn new<I, L>(reads: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            queue: reads
                .into_iter()
                .map(|read| read.into_iter().map(Into::into).collect())
                .collect(),
        }
    }
}
impl LineSource for ManualSource {
    fn next_lines(&mut self) -> Result<Vec<String>, MonitorError> {
        Ok(self.queue.pop_front().unwrap_or_default())
    }
}

/// Battery-charger style MCU that prints `state:..,CHG:..mv,...` lines at a
/// fixed rate. Used by the SIM connection mode.
pub struct SimulatedDevice {
    rng: StdRng,
    line_interval: Duration,
    last_emit: Option<Instant>,
    state: i64,
    chg_mv: f64,
    t1_mv: f64,
    t2_mv: f64,
    q6_mv: f64,
    phase: f64,
}
impl SimulatedDevice {
    pub fn new(line_interval: Duration) -> Self {
        Self::with_rng(StdRng::from_entropy(), line_interval)
    }
    pub fn with_seed(seed: u64, line_interval: Duration) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), line_interval)
    }
    fn with_rng(rng: StdRng, line_interval: Duration) -> Self {
        Self {
            rng,
            line_interval: line_interval.max(Duration::from_millis(1)),
            last_emit: None,
            state: 5,
            chg_mv: 4179.0,
            t1_mv: 2296.0,
            t2_mv: 1589.0,
            q6_mv: 2111.0,
            phase: 0.0,
        }
    }

    /// One device line, advancing the simulated state.
    pub fn generate_line(&mut self) -> String {
        self.phase += 0.05;
        self.chg_mv = (self.chg_mv + self.rng.gen_range(-2.0..2.5)).clamp(3000.0, 4350.0);
        self.t1_mv += self.rng.gen_range(-3.0..3.0);
        self.t2_mv = 1589.0 + (self.phase * 0.7).sin() * 40.0;
        self.q6_mv = 2111.0 + self.rng.gen_range(-5.0..5.0);
        if self.rng.gen_bool(0.01) {
            self.state = self.rng.gen_range(0..8);
        }
        let q23 = 21 + (self.phase.sin() * 4.0).round() as i64;
        format!(
            "state:{},CHG:{}mv,T1:{}mv,T2:{}mv,Q6:{}mv,Q2/Q3:{}mv",
            self.state,
            self.chg_mv.round() as i64,
            self.t1_mv.round().max(0.0) as i64,
            self.t2_mv.round() as i64,
            self.q6_mv.round() as i64,
            q23.max(0),
        )
    }
}
impl LineSource for SimulatedDevice {
    fn next_lines(&mut self) -> Result<Vec<String>, MonitorError> {
        let now = Instant::now();
        let due = match self.last_emit {
            None => 1,
            Some(last) => {
                let elapsed = now.duration_since(last);
                (elapsed.as_secs_f64() / self.line_interval.as_secs_f64()).floor() as usize
            }
        };
        if due == 0 {
            return Ok(Vec::new());
        }
        self.last_emit = Some(now);
        // Cap catch-up after a long stall (window moved, debugger, ...).
        Ok((0..due.min(50)).map(|_| self.generate_line()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::parser::parse_kv_line;
    #[test]
    fn manual_source_replays_then_runs_dry() {
        let mut source = ManualSource::new(vec![vec!["a1:1", "a1:2"], vec!["b1:3"]]);
        assert_eq!(source.next_lines().unwrap().len(), 2);
        assert_eq!(source.next_lines().unwrap(), vec!["b1:3".to_owned()]);
        assert!(source.next_lines().unwrap().is_empty());
    }
    #[test]
    fn simulated_lines_parse_into_six_channels() {
        let mut device = SimulatedDevice::with_seed(7, Duration::from_millis(100));
        for _ in 0..200 {
            let record = parse_kv_line(&device.generate_line());
            assert_eq!(record.len(), 6);
            assert!(record.iter().all(|(_, v)| v >= 0));
            assert!(record.get("Q2/Q3").is_some());
        }
    }
    #[test]
    fn first_poll_emits_one_line() {
        let mut device = SimulatedDevice::with_seed(1, Duration::from_secs(60));
        assert_eq!(device.next_lines().unwrap().len(), 1);
        assert!(device.next_lines().unwrap().is_empty());
    }
}
