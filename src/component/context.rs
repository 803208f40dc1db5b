//! Per-component handle to the pipeline.

use super::{ComponentStats, LifecycleFlags};
use crate::config::PipelineConfig;
use crate::event::{Event, EventChannel};
use crate::pipeline::{ComponentId, PipelineShared};
use crate::stop::StopSignal;
use crate::types::ComponentRole;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

const RUNNING_POLL: Duration = Duration::from_millis(10);

/// Everything a component hook may touch outside its own streams.
///
/// Created when the component is wired and kept for the pipeline's
/// lifetime; flags, stats and the stop signal are reset at every start.
pub struct ComponentContext {
    name: String,
    id: ComponentId,
    role: ComponentRole,
    shared: Arc<PipelineShared>,
    stop: StopSignal,
    flags: LifecycleFlags,
    stats: ComponentStats,
    outgoing: RwLock<Option<Arc<EventChannel>>>,
    incoming: RwLock<Vec<Arc<EventChannel>>>,
}

impl ComponentContext {
    pub(crate) fn new(
        name: impl Into<String>,
        id: ComponentId,
        role: ComponentRole,
        shared: Arc<PipelineShared>,
    ) -> Self {
        Self {
            name: name.into(),
            id,
            role,
            shared,
            stop: StopSignal::new(),
            flags: LifecycleFlags::new(),
            stats: ComponentStats::default(),
            outgoing: RwLock::new(None),
            incoming: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn role(&self) -> ComponentRole {
        self.role
    }

    pub fn config(&self) -> &PipelineConfig {
        self.shared.config()
    }

    pub(crate) fn shared(&self) -> &Arc<PipelineShared> {
        &self.shared
    }

    /// Pipeline virtual time in seconds
    pub fn time(&self) -> f64 {
        self.shared.clock().time()
    }

    pub fn time_ms(&self) -> i64 {
        self.shared.clock().time_ms()
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// True once the pipeline asked this component to terminate
    pub fn is_stopping(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Interruptible sleep. Returns false if interrupted by a stop.
    pub fn sleep(&self, duration: Duration) -> bool {
        !self.stop.wait_timeout(duration)
    }

    pub fn flags(&self) -> &LifecycleFlags {
        &self.flags
    }

    pub fn stats(&self) -> &ComponentStats {
        &self.stats
    }

    pub fn outgoing(&self) -> Option<Arc<EventChannel>> {
        self.outgoing.read().clone()
    }

    pub fn incoming(&self) -> Vec<Arc<EventChannel>> {
        self.incoming.read().clone()
    }

    pub(crate) fn set_outgoing(&self, channel: Arc<EventChannel>) {
        *self.outgoing.write() = Some(channel);
    }

    pub(crate) fn add_incoming(&self, channel: Arc<EventChannel>) {
        self.incoming.write().push(channel);
    }

    /// Push `event` on the outgoing channel with this component as sender.
    /// Returns the assigned id, or `None` without an outgoing channel.
    pub fn emit(&self, event: Event) -> Option<u64> {
        let channel = self.outgoing()?;
        Some(channel.push_event(event.with_sender(self.name.clone())))
    }

    /// Block until the pipeline is live. Returns false if stopped first.
    pub fn wait_until_running(&self) -> bool {
        loop {
            if self.shared.is_running() {
                return true;
            }
            if self.stop.wait_timeout(RUNNING_POLL) {
                return false;
            }
        }
    }

    /// Clear per-run state before the component's thread is spawned
    pub(crate) fn reset_for_run(&self) {
        self.stop.reset();
        self.flags.reset();
        self.stats.reset();
    }
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("role", &self.role)
            .field("state", &self.flags.state())
            .finish()
    }
}
