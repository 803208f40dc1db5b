//! State shared between the orchestrator and every component thread.

use super::{PipelineClock, Supervisor};
use crate::config::PipelineConfig;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct PipelineShared {
    config: PipelineConfig,
    clock: PipelineClock,
    supervisor: Supervisor,
    running: AtomicBool,
    stopping: AtomicBool,
}

impl PipelineShared {
    pub(crate) fn new(config: PipelineConfig) -> Self {
        let supervisor = Supervisor::new(config.error_policy);
        Self {
            config,
            clock: PipelineClock::new(),
            supervisor,
            running: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn clock(&self) -> &PipelineClock {
        &self.clock
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// True between the end of `start()` and the beginning of `stop()`
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Claim the stop sequence; false if another caller already holds it
    pub(crate) fn begin_stopping(&self) -> bool {
        self.stopping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_stopping(&self) {
        self.stopping.store(false, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }
}
