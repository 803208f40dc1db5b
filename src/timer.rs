//! Fixed-phase periodic timer used by every scheduled component loop.
//!
//! The wake point always advances by exactly one period, no matter how late
//! the caller arrives. A late iteration is therefore followed by shorter
//! waits until the schedule is caught up, so the average rate equals the
//! configured rate.

use crate::stop::StopSignal;
use std::time::{Duration, Instant};

/// Sleep with the condvar up to this close to the wake point, then spin
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);
const SPIN_MARGIN: Duration = Duration::from_millis(1);

/// Outcome of one [`Timer::sync`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    /// Woke at the scheduled point
    OnTime,
    /// The caller arrived after the wake point
    Late { missed_by: Duration },
    /// The stop signal fired while waiting
    Stopped,
}

impl TickStatus {
    pub fn is_late(&self) -> bool {
        matches!(self, TickStatus::Late { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Timer {
    period: Duration,
    start_offset: Duration,
    next: Instant,
    ticks: u64,
    late_ticks: u64,
}

impl Timer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            start_offset: Duration::ZERO,
            next: Instant::now() + period,
            ticks: 0,
            late_ticks: 0,
        }
    }

    /// Period given in (fractional) seconds
    pub fn from_secs(seconds: f64) -> Self {
        Self::new(Duration::from_secs_f64(seconds.max(0.0)))
    }

    /// Delay the first wake point by `offset` on top of one period
    pub fn with_start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self.next = Instant::now() + self.period + offset;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Anchor the schedule at now + period + start offset
    pub fn reset(&mut self) {
        self.next = Instant::now() + self.period + self.start_offset;
        self.ticks = 0;
        self.late_ticks = 0;
    }

    /// Wait for the next wake point, then advance it by one period
    pub fn sync(&mut self, stop: &StopSignal) -> TickStatus {
        let now = Instant::now();
        let status = if now > self.next {
            TickStatus::Late {
                missed_by: now - self.next,
            }
        } else {
            let remaining = self.next - now;
            if remaining > SPIN_THRESHOLD && stop.wait_timeout(remaining - SPIN_MARGIN) {
                return TickStatus::Stopped;
            }
            while Instant::now() < self.next {
                std::hint::spin_loop();
            }
            TickStatus::OnTime
        };

        self.next += self.period;
        self.ticks += 1;
        if status.is_late() {
            self.late_ticks += 1;
        }
        status
    }

    pub fn next_wake(&self) -> Instant {
        self.next
    }

    /// Completed ticks since the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn late_ticks(&self) -> u64 {
        self.late_ticks
    }
}
