//! Per-component lifecycle flags, state machine and counters.

use crate::types::{ComponentReport, ComponentRole, ComponentState};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

/// Flags shared between a component thread and the pipeline.
///
/// `terminate_requested` is set by `stop()`, `safe_to_kill` by the thread
/// once it has finished. The pipeline waits on the latter with a deadline
/// and marks the component `Forced` if it expires.
#[derive(Debug, Default)]
pub struct LifecycleFlags {
    terminate_requested: AtomicBool,
    is_setup: AtomicBool,
    failed: AtomicBool,
    state: AtomicU8,
    safe_to_kill: Mutex<bool>,
    safe_cond: Condvar,
}

impl LifecycleFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the run flags at pipeline start; `is_setup` survives
    pub fn reset(&self) {
        self.terminate_requested.store(false, Ordering::Release);
        self.failed.store(false, Ordering::Release);
        self.set_state(ComponentState::Idle);
        *self.safe_to_kill.lock() = false;
    }

    pub fn mark_setup(&self) {
        self.is_setup.store(true, Ordering::Release);
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup.load(Ordering::Acquire)
    }

    pub fn state(&self) -> ComponentState {
        ComponentState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ComponentState) {
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Set the terminate flag and move a running component to `CloseRequested`
    pub fn request_close(&self) {
        self.terminate_requested.store(true, Ordering::Release);
        let _ = self.state.compare_exchange(
            ComponentState::Running.to_u8(),
            ComponentState::CloseRequested.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn is_terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::Acquire)
    }

    /// Remember that a fatal error happened outside the runner loop
    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Called by the thread on exit. A component already marked `Forced`
    /// keeps that state.
    pub(crate) fn finish(&self, state: ComponentState) {
        if self.state() != ComponentState::Forced {
            self.set_state(state);
        }
        let mut safe = self.safe_to_kill.lock();
        *safe = true;
        self.safe_cond.notify_all();
    }

    pub fn is_safe_to_kill(&self) -> bool {
        *self.safe_to_kill.lock()
    }

    /// Wait until the thread finished or `deadline` passed
    pub fn wait_safe_to_kill(&self, deadline: Instant) -> bool {
        let mut safe = self.safe_to_kill.lock();
        while !*safe {
            if self.safe_cond.wait_until(&mut safe, deadline).timed_out() {
                return *safe;
            }
        }
        true
    }
}

/// Runtime counters of one component
#[derive(Debug, Default)]
pub struct ComponentStats {
    iterations: AtomicU64,
    failed_iterations: AtomicU64,
    late_ticks: AtomicU64,
    zero_filled_samples: AtomicU64,
    events_handled: AtomicU64,
}

impl ComponentStats {
    pub fn reset(&self) {
        self.iterations.store(0, Ordering::Relaxed);
        self.failed_iterations.store(0, Ordering::Relaxed);
        self.late_ticks.store(0, Ordering::Relaxed);
        self.zero_filled_samples.store(0, Ordering::Relaxed);
        self.events_handled.store(0, Ordering::Relaxed);
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the failure count including this one
    pub fn record_failure(&self) -> u64 {
        self.failed_iterations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_late_tick(&self) {
        self.late_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zero_fill(&self, samples: u64) {
        self.zero_filled_samples.fetch_add(samples, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Relaxed)
    }

    pub fn failed_iterations(&self) -> u64 {
        self.failed_iterations.load(Ordering::Relaxed)
    }

    pub fn zero_filled_samples(&self) -> u64 {
        self.zero_filled_samples.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, name: &str, role: ComponentRole, state: ComponentState) -> ComponentReport {
        ComponentReport {
            name: name.to_string(),
            role: Some(role),
            state,
            iterations: self.iterations(),
            failed_iterations: self.failed_iterations(),
            late_ticks: self.late_ticks.load(Ordering::Relaxed),
            zero_filled_samples: self.zero_filled_samples(),
            events_handled: self.events_handled.load(Ordering::Relaxed),
        }
    }
}

/// Lets the first occurrence through, then every `every`-th
#[derive(Debug, Clone)]
pub(crate) struct LogThrottle {
    every: u64,
    count: u64,
}

impl LogThrottle {
    pub(crate) const DEFAULT_EVERY: u64 = 100;

    pub(crate) fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
        }
    }

    pub(crate) fn should_log(&mut self) -> bool {
        self.count += 1;
        self.count == 1 || self.count % self.every == 0
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EVERY)
    }
}
