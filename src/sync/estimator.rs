//! Minimum round-trip clock offset estimation.

/// One accepted request/reply exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    pub rtt_ms: i64,
    /// `master − receive + rtt / 2`
    pub offset_ms: i64,
}

/// Keeps the lowest-latency sample of one sync interval.
///
/// Replies with a negative round trip cannot come from a sane exchange and
/// are discarded.
#[derive(Debug, Clone, Default)]
pub struct OffsetEstimator {
    best: Option<ClockSample>,
    accepted: u32,
    discarded: u32,
}

impl OffsetEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one reply. Returns the sample if it was accepted.
    pub fn add(&mut self, sent_ms: i64, master_ms: i64, received_ms: i64) -> Option<ClockSample> {
        let rtt_ms = received_ms - sent_ms;
        if rtt_ms < 0 {
            self.discarded += 1;
            return None;
        }
        let sample = ClockSample {
            rtt_ms,
            offset_ms: master_ms - received_ms + rtt_ms / 2,
        };
        self.accepted += 1;
        if self.best.map_or(true, |best| rtt_ms < best.rtt_ms) {
            self.best = Some(sample);
        }
        Some(sample)
    }

    pub fn best(&self) -> Option<ClockSample> {
        self.best
    }

    /// Return the interval's best sample and start a new interval
    pub fn take(&mut self) -> Option<ClockSample> {
        self.accepted = 0;
        self.discarded = 0;
        self.best.take()
    }

    pub fn accepted(&self) -> u32 {
        self.accepted
    }

    pub fn discarded(&self) -> u32 {
        self.discarded
    }
}
