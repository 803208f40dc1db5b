//! Stall watchdog of a channel.
//!
//! The channel checks in after every push. When no check-in arrives within
//! the watch interval, the watchdog zero-fills the channel's buffer up to
//! the sample the pipeline clock says should exist by now, so downstream
//! readers keep receiving full windows. Every sync interval it also
//! re-anchors the buffer to the clock when its position has drifted.

use super::lifecycle::LogThrottle;
use super::ComponentContext;
use crate::buffer::TimeBuffer;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, warn};

pub(crate) struct Watchdog {
    ctx: Arc<ComponentContext>,
    buffer: Arc<TimeBuffer>,
    checkins: Receiver<()>,
    throttle: LogThrottle,
}

impl Watchdog {
    pub(crate) fn new(ctx: Arc<ComponentContext>, buffer: Arc<TimeBuffer>, checkins: Receiver<()>) -> Self {
        Self {
            ctx,
            buffer,
            checkins,
            throttle: LogThrottle::default(),
        }
    }

    pub(crate) fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name(format!("{}-watchdog", self.ctx.name()))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        if !self.ctx.wait_until_running() {
            return;
        }
        let settings = self.ctx.config().watchdog.clone();
        let watch_interval = settings.watch_interval();
        let mut last_sync = Instant::now();

        while !self.ctx.is_stopping() {
            match self.checkins.recv_timeout(watch_interval) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => self.fill_gap(),
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(sync_interval) = settings.sync_interval() {
                if last_sync.elapsed() >= sync_interval {
                    self.resync(watch_interval.as_secs_f64());
                    last_sync = Instant::now();
                }
            }
        }
        debug!(component = %self.ctx.name(), "Watchdog finished");
    }

    /// Samples the buffer should hold according to the pipeline clock
    fn expected_position(&self) -> i64 {
        (self.ctx.time() * self.buffer.sample_rate()).round() as i64
    }

    fn fill_gap(&mut self) {
        if self.ctx.is_stopping() {
            return;
        }
        let missing = self.expected_position() - self.buffer.position_samples();
        if missing <= 0 {
            return;
        }
        self.buffer.push_zeroes(missing as usize);
        self.ctx.stats().record_zero_fill(missing as u64);
        if self.throttle.should_log() {
            warn!(
                component = %self.ctx.name(),
                samples = missing,
                stalls = self.throttle.count(),
                "Channel stalled, zero-filled its buffer"
            );
        }
    }

    fn resync(&self, watch_secs: f64) {
        let drift = self.buffer.position_samples() - self.expected_position();
        let tolerance = (self.buffer.sample_rate() * watch_secs).ceil() as i64;
        if drift.abs() > tolerance {
            debug!(component = %self.ctx.name(), drift, "Re-anchoring buffer to pipeline clock");
            self.buffer.sync(self.ctx.time());
        }
    }
}
