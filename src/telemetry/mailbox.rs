/// Lines received from the reader thread plus the capture time of the newest read.
#[derive(Clone, Debug, PartialEq)]
pub struct LineBatch {
    pub lines: Vec<String>,
    pub now: f64,
}

/// Pending-line buffer between the reader thread and the store owner.
///
/// Append-and-cap: past `capacity` the oldest lines are dropped and counted,
/// so a burst from the device never stalls the UI tick.
#[derive(Debug)]
pub struct LineMailbox {
    pending: Vec<String>,
    pending_now: Option<f64>,
    capacity: usize,
    dropped: u64,
}
impl LineMailbox {
    pub const DEFAULT_CAPACITY: usize = 2_000;

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: Vec::with_capacity(capacity),
            pending_now: None,
            capacity,
            dropped: 0,
        }
    }
    pub fn push(&mut self, lines: impl IntoIterator<Item = String>, now: f64) {
        let before = self.pending.len();
        self.pending.extend(lines);
        if self.pending.len() == before {
            return;
        }
        if self.pending.len() > self.capacity {
            let overflow = self.pending.len() - self.capacity;
            self.pending.drain(..overflow);
            self.dropped += overflow as u64;
        }
        self.pending_now = Some(now);
    }
    /// Drains everything queued so far. `fallback_now` stands in when the
    /// queued lines came without a capture time.
    pub fn take(&mut self, fallback_now: f64) -> Option<LineBatch> {
        if self.pending.is_empty() {
            return None;
        }
        let lines = std::mem::take(&mut self.pending);
        let now = self.pending_now.take().unwrap_or(fallback_now);
        Some(LineBatch { lines, now })
    }
    pub fn consume_dropped(&mut self) -> u64 {
        std::mem::take(&mut self.dropped)
    }
    pub fn clear(&mut self) {
        self.pending.clear();
        self.pending_now = None;
        self.dropped = 0;
    }
    pub fn pending_lines(&self) -> usize {
        self.pending.len()
    }
}
impl Default for LineMailbox {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}
