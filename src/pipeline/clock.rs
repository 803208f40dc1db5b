//! Virtual pipeline clock.
//!
//! Time is the elapsed time since the pipeline went live plus an offset in
//! milliseconds. The offset is the only mutable part and is adjusted by
//! network clock synchronisation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Origin {
    instant: Instant,
    wall: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PipelineClock {
    origin: Mutex<Option<Origin>>,
    offset_ms: AtomicI64,
}

impl PipelineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the origin to now and clear the offset
    pub fn start(&self) {
        *self.origin.lock() = Some(Origin {
            instant: Instant::now(),
            wall: Utc::now(),
        });
        self.offset_ms.store(0, Ordering::Release);
    }

    /// Forget the origin; time reads as the offset alone afterwards
    pub fn clear(&self) {
        *self.origin.lock() = None;
        self.offset_ms.store(0, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.origin.lock().is_some()
    }

    /// Wall-clock time at which the clock was started
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.origin.lock().map(|o| o.wall)
    }

    fn elapsed_ms(&self) -> f64 {
        self.origin
            .lock()
            .map(|o| o.instant.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    /// Virtual time in seconds
    pub fn time(&self) -> f64 {
        (self.elapsed_ms() + self.offset_ms() as f64) / 1000.0
    }

    /// Virtual time in whole milliseconds
    pub fn time_ms(&self) -> i64 {
        self.elapsed_ms() as i64 + self.offset_ms()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    /// Shift the clock by `delta_ms`
    pub fn adjust(&self, delta_ms: i64) {
        self.offset_ms.fetch_add(delta_ms, Ordering::AcqRel);
    }
}
