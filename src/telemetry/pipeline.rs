use log::debug;

use crate::telemetry::mailbox::{LineBatch, LineMailbox};
use crate::telemetry::parser::parse_kv_line;
use crate::telemetry::source::LineSource;
use crate::telemetry::store::ChannelStore;
use crate::telemetry::MonitorError;

/// What one flush did, for the status bar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IngestReport {
    pub now: f64,
    pub lines: usize,
    /// Lines that produced at least one field.
    pub records: usize,
    /// Lines the mailbox had to drop since the previous report.
    pub dropped_lines: u64,
    /// Unseen keys rejected at capacity since the previous report.
    pub dropped_keys: u64,
}

/// Owner of the store: queues raw lines and applies them in receipt order,
/// pruning after every batch so readers always see a windowed store.
pub struct IngestionPipeline {
    store: ChannelStore,
    mailbox: LineMailbox,
}
impl IngestionPipeline {
    pub fn new(time_window_secs: f64, max_pending_lines: usize) -> Self {
        Self {
            store: ChannelStore::with_time_window(time_window_secs),
            mailbox: LineMailbox::with_capacity(max_pending_lines),
        }
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }
    pub fn store_mut(&mut self) -> &mut ChannelStore {
        &mut self.store
    }
    pub fn pending(&self) -> usize {
        self.mailbox.pending_lines()
    }

    pub fn offer(&mut self, lines: Vec<String>, now: f64) {
        self.mailbox.push(lines, now);
    }

    /// Applies everything queued; `None` when nothing was pending.
    pub fn flush(&mut self, fallback_now: f64) -> Option<IngestReport> {
        let batch = self.mailbox.take(fallback_now)?;
        Some(self.apply(batch))
    }

    /// Reads one round from `source` and applies it straight away.
    pub fn pump<S: LineSource>(
        &mut self,
        source: &mut S,
        now: f64,
    ) -> Result<Option<IngestReport>, MonitorError> {
        let lines = source.next_lines()?;
        if lines.is_empty() {
            return Ok(None);
        }
        self.offer(lines, now);
        Ok(self.flush(now))
    }

    fn apply(&mut self, batch: LineBatch) -> IngestReport {
        let LineBatch { lines, now } = batch;
        let mut records = 0;
        for line in &lines {
            let record = parse_kv_line(line);
            if record.is_empty() {
                continue;
            }
            records += 1;
            self.store.update(&record, now);
        }
        self.store.prune(now);
        let report = IngestReport {
            now,
            lines: lines.len(),
            records,
            dropped_lines: self.mailbox.consume_dropped(),
            dropped_keys: self.store.consume_dropped_keys(),
        };
        debug!(
            "ingested {} lines ({} records), {} channels, {} samples",
            report.lines,
            report.records,
            self.store.channel_count(),
            self.store.total_samples()
        );
        report
    }

    /// Manual "Refresh": keep channels, forget samples and queued lines.
    pub fn reset_samples(&mut self) {
        self.mailbox.clear();
        self.store.reset_samples();
    }

    /// Drops queued lines without touching the store.
    pub fn discard_pending(&mut self) {
        self.mailbox.clear();
    }

    /// Full reset before a new connection.
    pub fn reset(&mut self) {
        self.mailbox.clear();
        self.store.reset();
    }
}
