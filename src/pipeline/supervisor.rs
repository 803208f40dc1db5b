//! Pipeline-level error sink and stop-request channel.
//!
//! Runners report failures here from their own threads. Every failure is
//! logged and the most recent [`FAILURE_HISTORY`] are kept for
//! [`Pipeline::failures`](super::Pipeline::failures); under [`ErrorPolicy::StopPipeline`] a fatal failure also raises a stop
//! request that the application observes via `wait_for_stop_request`.

use crate::config::ErrorPolicy;
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

/// Failures retained per run; older ones are dropped first
pub const FAILURE_HISTORY: usize = 256;

/// A failure reported by a component runner
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFailure {
    pub component: String,
    pub message: String,
    pub fatal: bool,
    pub at: DateTime<Utc>,
}

pub struct Supervisor {
    policy: ErrorPolicy,
    failures: Mutex<VecDeque<ComponentFailure>>,
    dropped: AtomicU64,
    stop_tx: Sender<String>,
    stop_rx: Receiver<String>,
    stop_requested: AtomicBool,
}

impl Supervisor {
    pub fn new(policy: ErrorPolicy) -> Self {
        // One pending request is enough; later ones are redundant.
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            policy,
            failures: Mutex::new(VecDeque::with_capacity(FAILURE_HISTORY)),
            dropped: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            stop_requested: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> ErrorPolicy {
        self.policy
    }

    /// Record a failure and apply the error policy
    pub fn report(&self, component: &str, message: impl Into<String>, fatal: bool) {
        let failure = ComponentFailure {
            component: component.to_string(),
            message: message.into(),
            fatal,
            at: Utc::now(),
        };

        if fatal {
            error!(component = %failure.component, "Fatal component error: {}", failure.message);
        } else {
            warn!(component = %failure.component, "Component error: {}", failure.message);
        }

        let escalate = fatal && self.policy == ErrorPolicy::StopPipeline;
        let reason = format!("fatal error in '{}'", failure.component);
        {
            let mut failures = self.failures.lock();
            if failures.len() == FAILURE_HISTORY {
                failures.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            failures.push_back(failure);
        }

        if escalate {
            self.request_stop(reason);
        }
    }

    /// The retained failures since the last reset, oldest first
    pub fn failures(&self) -> Vec<ComponentFailure> {
        self.failures.lock().iter().cloned().collect()
    }

    /// Failures pushed out of the history since the last reset
    pub fn dropped_failures(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Ask the application to stop the pipeline
    pub fn request_stop(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            info!("Pipeline stop requested: {}", reason);
        }
        let _ = self.stop_tx.try_send(reason);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Block up to `timeout` for a stop request. Returns true if one is pending.
    pub fn wait_for_stop_request(&self, timeout: Duration) -> bool {
        if self.is_stop_requested() {
            return true;
        }
        self.stop_rx.recv_timeout(timeout).is_ok() || self.is_stop_requested()
    }

    /// Clear failures and pending stop requests for a new run
    pub fn reset(&self) {
        self.failures.lock().clear();
        self.dropped.store(0, Ordering::Relaxed);
        while self.stop_rx.try_recv().is_ok() {}
        self.stop_requested.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("policy", &self.policy)
            .field("stop_requested", &self.is_stop_requested())
            .finish()
    }
}
