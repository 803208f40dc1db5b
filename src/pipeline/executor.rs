//! Pipeline executor: wiring, start and stop of component threads.
//!
//! `start()`:
//! 1. Reset buffers, event channels, sensor links, component flags and counters.
//! 2. Spawn one thread per component in insertion order, plus a watchdog
//!    per channel.
//! 3. Count down, then pass the network start barrier if configured.
//! 4. Start the virtual clock and mark the pipeline running.
//!
//! `stop()` closes buffers and event channels, then asks components to
//! finish in reverse order and waits for each up to the close timeout.

use super::{ComponentId, PipelineError, PipelineResult, PipelineShared, SensorId};
use crate::buffer::TimeBuffer;
use crate::component::runner::{
    run_component, ChannelRunner, ConsumerRunner, HandlerListener, HandlerRunner, Runner,
    SensorRunner, Source, TransformerRunner, Trigger,
};
use crate::component::watchdog::Watchdog;
use crate::component::{
    Channel, ComponentContext, ComponentResult, Consumer, EventHandler, SensorLink, Sensor,
    Transformer,
};
use crate::config::PipelineConfig;
use crate::error::ResultExt;
use crate::event::{Dispatcher, EventChannel};
use crate::pipeline::ComponentFailure;
use crate::stream::StreamDescriptor;
use crate::sync::NetworkSync;
use crate::types::{ComponentReport, ComponentRole, ComponentState, ConnectionStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

/// A component and everything the pipeline keeps about it.
struct Slot {
    ctx: Arc<ComponentContext>,
    /// Present while the component is not running
    runner: Option<Runner>,
    thread: Option<JoinHandle<Runner>>,
    watchdog: Option<JoinHandle<()>>,
    output: Option<Arc<TimeBuffer>>,
    /// Connection state shared between a sensor and its channel
    link: Option<SensorLink>,
    handler: Option<Arc<Mutex<Box<dyn EventHandler>>>>,
    priority: Option<i32>,
}

impl Slot {
    fn new(ctx: Arc<ComponentContext>, runner: Runner) -> Self {
        Self {
            ctx,
            runner: Some(runner),
            thread: None,
            watchdog: None,
            output: None,
            link: None,
            handler: None,
            priority: None,
        }
    }

    fn is_active(&self) -> bool {
        self.thread.is_some() || self.watchdog.is_some()
    }

    fn spawn(&mut self) -> PipelineResult<()> {
        let name = self.ctx.name().to_string();
        let mut runner = self
            .runner
            .take()
            .ok_or_else(|| PipelineError::ComponentLost(name.clone()))?;

        if let Runner::Channel(channel) = &mut runner {
            let (checkin_tx, checkin_rx) = crossbeam_channel::bounded(1);
            channel.checkin = Some(checkin_tx);
            let watchdog = Watchdog::new(Arc::clone(&self.ctx), Arc::clone(&channel.buffer), checkin_rx);
            match watchdog.spawn() {
                Ok(handle) => self.watchdog = Some(handle),
                Err(e) => {
                    channel.checkin = None;
                    self.runner = Some(runner);
                    return Err(PipelineError::Spawn {
                        component: format!("{}-watchdog", name),
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(priority) = self.priority {
            debug!(component = %name, priority, "Thread priority requested, scheduling is left to the OS");
        }

        let ctx = Arc::clone(&self.ctx);
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_component(runner, ctx))
            .map_err(|e| PipelineError::Spawn {
                component: name,
                message: e.to_string(),
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Wait for the thread up to `timeout`; a thread that misses it is
    /// marked `Forced` and detached.
    fn close(&mut self, timeout: Duration) {
        if let Some(handle) = self.thread.take() {
            let flags = self.ctx.flags();
            if flags.wait_safe_to_kill(Instant::now() + timeout) {
                match handle.join() {
                    Ok(runner) => self.runner = Some(runner),
                    Err(_) => error!(component = %self.ctx.name(), "Component thread panicked after finishing"),
                }
            } else {
                flags.set_state(ComponentState::Forced);
                warn!(
                    component = %self.ctx.name(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Component did not terminate in time, detaching its thread"
                );
            }
        }

        if let Some(watchdog) = self.watchdog.take() {
            if watchdog.join().is_err() {
                error!(component = %self.ctx.name(), "Watchdog thread panicked");
            }
        }
    }

    fn report(&self) -> ComponentReport {
        self.ctx
            .stats()
            .snapshot(self.ctx.name(), self.ctx.role(), self.ctx.flags().state())
    }
}

/// The orchestrator of one set of wired components.
pub struct Pipeline {
    shared: Arc<PipelineShared>,
    runtime: Option<Runtime>,
    handle: Handle,
    slots: Vec<Slot>,
    event_channels: Vec<Arc<EventChannel>>,
    network: Option<NetworkSync>,
    start_cancel: CancellationToken,
    released: bool,
}

impl Pipeline {
    /// Validate `config` and build the runtime that dispatches events and
    /// runs network synchronisation.
    pub fn new(config: PipelineConfig) -> crate::Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("fusion-dispatch")
            .enable_all()
            .build()
            .context("Failed to build the dispatch runtime")?;
        let handle = runtime.handle().clone();

        Ok(Self {
            shared: Arc::new(PipelineShared::new(config)),
            runtime: Some(runtime),
            handle,
            slots: Vec::new(),
            event_channels: Vec::new(),
            network: None,
            start_cancel: CancellationToken::new(),
            released: false,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.shared.config()
    }

    pub fn shared(&self) -> &Arc<PipelineShared> {
        &self.shared
    }

    // ── Wiring ──

    fn ensure_wirable(&self) -> PipelineResult<()> {
        if self.released {
            return Err(PipelineError::Released);
        }
        if self.shared.is_running() || self.slots.iter().any(Slot::is_active) {
            return Err(PipelineError::Running);
        }
        Ok(())
    }

    fn slot(&self, id: ComponentId) -> PipelineResult<&Slot> {
        self.slots
            .get(id.index())
            .ok_or(PipelineError::UnknownComponent(id))
    }

    fn new_context(&self, name: &str, role: ComponentRole) -> PipelineResult<Arc<ComponentContext>> {
        if self.slots.iter().any(|s| s.ctx.name() == name) {
            return Err(PipelineError::DuplicateName(name.to_string()));
        }
        let id = ComponentId(self.slots.len() as u32);
        Ok(Arc::new(ComponentContext::new(
            name,
            id,
            role,
            Arc::clone(&self.shared),
        )))
    }

    fn push_slot(&mut self, slot: Slot) -> ComponentId {
        let id = slot.ctx.id();
        slot.ctx.flags().mark_setup();
        debug!(component = %slot.ctx.name(), role = %slot.ctx.role(), %id, "Component added");
        self.slots.push(slot);
        id
    }

    fn new_buffer(&self, name: &str, descriptor: StreamDescriptor) -> PipelineResult<Arc<TimeBuffer>> {
        if descriptor.dim == 0 || !(descriptor.sample_rate > 0.0) {
            return Err(PipelineError::Init {
                component: name.to_string(),
                message: format!(
                    "invalid output stream: dim {}, sample rate {}",
                    descriptor.dim, descriptor.sample_rate
                ),
            });
        }
        Ok(Arc::new(TimeBuffer::new(
            name,
            descriptor,
            self.shared.config().buffer_seconds,
        )))
    }

    /// Output buffers of `ids`, each of which must already be set up
    fn source_buffers(&self, ids: &[ComponentId]) -> PipelineResult<Vec<Arc<TimeBuffer>>> {
        if ids.is_empty() {
            return Err(PipelineError::InvalidWindow("no sources given".to_string()));
        }
        ids.iter()
            .map(|&id| {
                let slot = self.slot(id)?;
                if !slot.ctx.flags().is_setup() {
                    return Err(PipelineError::SourceNotSetup(id));
                }
                slot.output.clone().ok_or(PipelineError::SourceNotSetup(id))
            })
            .collect()
    }

    /// Convert a window in seconds to samples of every source
    fn windows(buffers: Vec<Arc<TimeBuffer>>, frame: f64, delta: f64) -> PipelineResult<Vec<Source>> {
        if !(frame > 0.0) || !(delta >= 0.0) {
            return Err(PipelineError::InvalidWindow(format!(
                "frame {}s / delta {}s",
                frame, delta
            )));
        }
        buffers
            .into_iter()
            .map(|buffer| {
                let frame_samples = buffer.descriptor().samples_for(frame);
                let delta_samples = buffer.descriptor().samples_for(delta);
                if frame_samples == 0 {
                    return Err(PipelineError::InvalidWindow(format!(
                        "frame of {}s is shorter than one sample of '{}'",
                        frame,
                        buffer.name()
                    )));
                }
                if frame_samples + delta_samples > buffer.capacity_samples() {
                    return Err(PipelineError::InvalidWindow(format!(
                        "window of {} samples exceeds the {} samples held by '{}'",
                        frame_samples + delta_samples,
                        buffer.capacity_samples(),
                        buffer.name()
                    )));
                }
                Ok(Source {
                    buffer,
                    frame: frame_samples,
                    delta: delta_samples,
                })
            })
            .collect()
    }

    /// Add a sensor and the channel that samples it
    pub fn add_sensor<S, C>(&mut self, sensor: S, channel: C) -> PipelineResult<(SensorId, ComponentId)>
    where
        S: Sensor,
        C: Channel,
    {
        self.ensure_wirable()?;
        let mut sensor: Box<dyn Sensor> = Box::new(sensor);
        let ctx = self.new_context(sensor.name(), ComponentRole::Sensor)?;
        init_hook(&ctx, sensor.init(&ctx))?;

        let link = SensorLink::new();
        let mut slot = Slot::new(
            ctx,
            Runner::Sensor(SensorRunner {
                sensor,
                link: link.clone(),
            }),
        );
        slot.link = Some(link);
        let sensor_id = SensorId(self.push_slot(slot));

        let channel_id = self.add_channel(sensor_id, channel)?;
        Ok((sensor_id, channel_id))
    }

    /// Add another channel to an existing sensor
    pub fn add_channel<C: Channel>(&mut self, sensor: SensorId, channel: C) -> PipelineResult<ComponentId> {
        self.ensure_wirable()?;
        let sensor_slot = self.slot(sensor.component())?;
        if !sensor_slot.ctx.flags().is_setup() {
            return Err(PipelineError::SourceNotSetup(sensor.component()));
        }
        let link = sensor_slot
            .link
            .clone()
            .ok_or(PipelineError::SourceNotSetup(sensor.component()))?;

        let mut channel: Box<dyn Channel> = Box::new(channel);
        let ctx = self.new_context(channel.name(), ComponentRole::Channel)?;
        init_hook(&ctx, channel.init(&ctx))?;
        let buffer = self.new_buffer(ctx.name(), channel.describe_output())?;

        let mut slot = Slot::new(
            ctx,
            Runner::Channel(ChannelRunner {
                channel,
                link,
                buffer: Arc::clone(&buffer),
                checkin: None,
            }),
        );
        slot.output = Some(buffer);
        Ok(self.push_slot(slot))
    }

    /// Add a transformer reading `frame + delta` seconds of every source
    /// per iteration and advancing by `frame`.
    pub fn add_transformer<T: Transformer>(
        &mut self,
        transformer: T,
        sources: &[ComponentId],
        frame: f64,
        delta: f64,
    ) -> PipelineResult<ComponentId> {
        self.ensure_wirable()?;
        let sources = Self::windows(self.source_buffers(sources)?, frame, delta)?;
        let mut transformer: Box<dyn Transformer> = Box::new(transformer);
        let ctx = self.new_context(transformer.name(), ComponentRole::Transformer)?;
        init_hook(&ctx, transformer.init(&ctx))?;

        let descriptors: Vec<StreamDescriptor> = sources
            .iter()
            .map(|s| s.buffer.descriptor().clone())
            .collect();
        let frames: Vec<usize> = sources.iter().map(|s| s.frame).collect();
        let spec = transformer.describe_output(&descriptors);
        let output_samples = transformer.output_samples(&frames).max(1);
        let rate = output_samples as f64 / frame;
        let descriptor = StreamDescriptor::new(spec.kind, spec.dim, rate).with_labels(spec.labels);
        let output = self.new_buffer(ctx.name(), descriptor)?;
        if output_samples > output.capacity_samples() {
            return Err(PipelineError::InvalidWindow(format!(
                "{} output samples per frame exceed the {} samples held by '{}'",
                output_samples,
                output.capacity_samples(),
                ctx.name()
            )));
        }

        let mut slot = Slot::new(
            ctx,
            Runner::Transformer(TransformerRunner {
                transformer,
                sources,
                output: Arc::clone(&output),
                frame_secs: frame,
                output_samples,
            }),
        );
        slot.output = Some(output);
        Ok(self.push_slot(slot))
    }

    /// Add a time-triggered consumer
    pub fn add_consumer<C: Consumer>(
        &mut self,
        consumer: C,
        sources: &[ComponentId],
        frame: f64,
        delta: f64,
    ) -> PipelineResult<ComponentId> {
        self.ensure_wirable()?;
        let sources = Self::windows(self.source_buffers(sources)?, frame, delta)?;
        self.push_consumer(Box::new(consumer), sources, Trigger::Timed { frame_secs: frame })
    }

    /// Add a consumer that reads the span of every complete event on `trigger`
    pub fn add_event_consumer<C: Consumer>(
        &mut self,
        consumer: C,
        sources: &[ComponentId],
        trigger: &Arc<EventChannel>,
    ) -> PipelineResult<ComponentId> {
        self.ensure_wirable()?;
        let sources = self
            .source_buffers(sources)?
            .into_iter()
            .map(|buffer| Source {
                buffer,
                frame: 1,
                delta: 0,
            })
            .collect();
        let id = self.push_consumer(Box::new(consumer), sources, Trigger::Event(Arc::clone(trigger)))?;
        self.slots[id.index()].ctx.add_incoming(Arc::clone(trigger));
        Ok(id)
    }

    fn push_consumer(
        &mut self,
        mut consumer: Box<dyn Consumer>,
        sources: Vec<Source>,
        trigger: Trigger,
    ) -> PipelineResult<ComponentId> {
        let ctx = self.new_context(consumer.name(), ComponentRole::Consumer)?;
        init_hook(&ctx, consumer.init(&ctx))?;
        let slot = Slot::new(
            ctx,
            Runner::Consumer(ConsumerRunner {
                consumer,
                sources,
                trigger,
            }),
        );
        Ok(self.push_slot(slot))
    }

    /// Add a component driven by events and optionally its own timer
    pub fn add_event_handler<H: EventHandler>(&mut self, handler: H) -> PipelineResult<ComponentId> {
        self.ensure_wirable()?;
        let mut handler: Box<dyn EventHandler> = Box::new(handler);
        let ctx = self.new_context(handler.name(), ComponentRole::EventHandler)?;
        init_hook(&ctx, handler.init(&ctx))?;

        let handler = Arc::new(Mutex::new(handler));
        let mut slot = Slot::new(
            ctx,
            Runner::EventHandler(HandlerRunner {
                handler: Arc::clone(&handler),
            }),
        );
        slot.handler = Some(handler);
        Ok(self.push_slot(slot))
    }

    /// Give `id` an outgoing event channel, created on first call
    pub fn register_event_provider(&mut self, id: ComponentId) -> PipelineResult<Arc<EventChannel>> {
        self.ensure_wirable()?;
        let ctx = Arc::clone(&self.slot(id)?.ctx);
        if let Some(channel) = ctx.outgoing() {
            return Ok(channel);
        }
        let channel = Arc::new(EventChannel::new(
            format!("{}-events", ctx.name()),
            self.shared.config().event_channel_capacity,
            Dispatcher::new(self.handle.clone()),
        ));
        ctx.set_outgoing(Arc::clone(&channel));
        self.event_channels.push(Arc::clone(&channel));
        Ok(channel)
    }

    /// Subscribe `id` to `channel`. Event handlers are notified of every
    /// pushed event; other roles see it in their incoming channels.
    pub fn register_event_listener(&mut self, id: ComponentId, channel: &Arc<EventChannel>) -> PipelineResult<()> {
        self.ensure_wirable()?;
        let slot = self.slot(id)?;
        slot.ctx.add_incoming(Arc::clone(channel));
        if let Some(handler) = &slot.handler {
            channel.add_listener(Arc::new(HandlerListener {
                handler: Arc::clone(handler),
                ctx: Arc::clone(&slot.ctx),
            }));
        }
        debug!(component = %slot.ctx.name(), channel = %channel.name(), "Listener registered");
        Ok(())
    }

    /// Record a scheduling priority for the component's thread
    pub fn set_thread_priority(&mut self, id: ComponentId, priority: i32) -> PipelineResult<()> {
        self.ensure_wirable()?;
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(PipelineError::UnknownComponent(id))?;
        slot.priority = Some(priority);
        Ok(())
    }

    // ── Lifecycle ──

    /// Token that cancels a pending countdown or start barrier. Cancelling
    /// it from another thread makes `start()` fail and unwind.
    pub fn start_cancel_token(&self) -> CancellationToken {
        self.start_cancel.clone()
    }

    pub fn start(&mut self) -> PipelineResult<()> {
        if self.released {
            return Err(PipelineError::Released);
        }
        if self.shared.is_running() || self.slots.iter().any(Slot::is_active) {
            return Err(PipelineError::Running);
        }
        if let Some(lost) = self.slots.iter().find(|s| s.runner.is_none()) {
            return Err(PipelineError::ComponentLost(lost.ctx.name().to_string()));
        }
        if self.start_cancel.is_cancelled() {
            self.start_cancel = CancellationToken::new();
        }

        info!(components = self.slots.len(), "Starting pipeline");
        self.reset_for_run();

        for index in 0..self.slots.len() {
            if let Err(e) = self.slots[index].spawn() {
                error!("Failed to start pipeline: {}", e);
                self.halt();
                return Err(e);
            }
        }

        if !self.countdown() {
            self.halt();
            return Err(PipelineError::StartBarrier("cancelled during countdown".to_string()));
        }

        let sync = self.shared.config().sync.clone();
        if sync.is_enabled() {
            let mut network = NetworkSync::new(
                sync,
                Arc::clone(&self.shared),
                self.handle.clone(),
                self.start_cancel.child_token(),
            );
            if let Err(e) = network.start_barrier() {
                error!("Start barrier failed: {}", e);
                network.shutdown();
                self.halt();
                return Err(PipelineError::StartBarrier(e.to_string()));
            }
            self.network = Some(network);
        }

        self.shared.clock().start();
        self.shared.set_running(true);

        if let Some(network) = &mut self.network {
            if let Err(e) = network.spawn_background() {
                warn!("Clock synchronisation unavailable: {}", e);
            }
        }
        info!("Pipeline running");
        Ok(())
    }

    /// Clear what the previous run left behind: failures, clock, buffers,
    /// event channels and sensor links
    fn reset_for_run(&self) {
        self.shared.supervisor().reset();
        self.shared.clock().clear();
        for slot in &self.slots {
            if let Some(buffer) = &slot.output {
                buffer.reset();
            }
            // A sensor that died keeps its link at Error until reset.
            if let Some(link) = &slot.link {
                link.set(ConnectionStatus::Disconnected);
            }
            slot.ctx.reset_for_run();
        }
        for channel in &self.event_channels {
            channel.reset();
        }
    }

    /// Count down the configured seconds. Returns false if cancelled.
    fn countdown(&self) -> bool {
        let seconds = self.shared.config().countdown_seconds;
        for remaining in (1..=seconds).rev() {
            info!(remaining, "Pipeline starting in {}s", remaining);
            let cancel = self.start_cancel.clone();
            let completed = self.handle.block_on(async move {
                tokio::select! {
                    _ = cancel.cancelled() => false,
                    _ = tokio::time::sleep(Duration::from_secs(1)) => true,
                }
            });
            if !completed {
                return false;
            }
        }
        true
    }

    /// Stop every component. Calling it when nothing runs is a no-op.
    pub fn stop(&mut self) -> PipelineResult<()> {
        if !self.shared.is_running() && !self.slots.iter().any(Slot::is_active) {
            debug!("Pipeline already stopped");
            return Ok(());
        }
        if !self.shared.begin_stopping() {
            return Ok(());
        }

        info!("Stopping pipeline");
        if let Some(network) = &self.network {
            if let Err(e) = network.send_stop() {
                warn!("Failed to send stop signal: {}", e);
            }
        }

        self.halt();

        if let Some(mut network) = self.network.take() {
            network.shutdown();
        }
        self.log_stats();
        self.shared.end_stopping();
        info!("Pipeline stopped");
        Ok(())
    }

    /// Close buffers and channels, then every component in reverse order
    fn halt(&mut self) {
        for slot in &self.slots {
            if let Some(buffer) = &slot.output {
                buffer.close();
            }
        }
        for channel in &self.event_channels {
            channel.close();
        }
        self.shared.set_running(false);

        for slot in self.slots.iter().rev() {
            slot.ctx.flags().request_close();
            slot.ctx.stop_signal().stop();
        }

        let timeout = self.shared.config().close_timeout();
        let mut forced = 0;
        for slot in self.slots.iter_mut().rev() {
            slot.close(timeout);
            if slot.ctx.flags().state() == ComponentState::Forced {
                forced += 1;
            }
        }
        if forced > 0 {
            warn!(forced, "Components detached after the close timeout");
        }
    }

    fn log_stats(&self) {
        for report in self.stats() {
            info!(
                component = %report.name,
                state = %report.state,
                iterations = report.iterations,
                failed = report.failed_iterations,
                late_ticks = report.late_ticks,
                zero_filled = report.zero_filled_samples,
                events = report.events_handled,
                "Component statistics"
            );
            if report.is_falling_behind() {
                warn!(component = %report.name, late_ticks = report.late_ticks, "Component fell behind its schedule");
            }
        }
        let dropped = self.shared.supervisor().dropped_failures();
        if dropped > 0 {
            warn!(dropped, "Older component failures were dropped from the history");
        }
    }

    /// Remove every component and event channel
    pub fn clear(&mut self) -> PipelineResult<()> {
        if self.shared.is_running() || self.slots.iter().any(Slot::is_active) {
            return Err(PipelineError::Running);
        }
        self.slots.clear();
        self.event_channels.clear();
        self.shared.supervisor().reset();
        self.shared.clock().clear();
        debug!("Pipeline cleared");
        Ok(())
    }

    /// Clear the pipeline and refuse any further use
    pub fn release(&mut self) -> PipelineResult<()> {
        if self.released {
            return Ok(());
        }
        self.clear()?;
        self.released = true;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
        }
        info!("Pipeline released");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    // ── Clock ──

    /// Virtual time in seconds
    pub fn time(&self) -> f64 {
        self.shared.clock().time()
    }

    pub fn time_ms(&self) -> i64 {
        self.shared.clock().time_ms()
    }

    /// Shift the virtual clock by `offset_ms`
    pub fn adjust_time(&self, offset_ms: i64) {
        self.shared.clock().adjust(offset_ms);
    }

    // ── Introspection ──

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn component_id(&self, name: &str) -> Option<ComponentId> {
        self.slots
            .iter()
            .find(|s| s.ctx.name() == name)
            .map(|s| s.ctx.id())
    }

    pub fn component_state(&self, id: ComponentId) -> Option<ComponentState> {
        self.slots.get(id.index()).map(|s| s.ctx.flags().state())
    }

    /// Output buffer of a channel or transformer
    pub fn buffer(&self, id: ComponentId) -> Option<Arc<TimeBuffer>> {
        self.slots.get(id.index()).and_then(|s| s.output.clone())
    }

    /// Outgoing event channel of a component
    pub fn event_channel(&self, id: ComponentId) -> Option<Arc<EventChannel>> {
        self.slots.get(id.index()).and_then(|s| s.ctx.outgoing())
    }

    pub fn stats(&self) -> Vec<ComponentReport> {
        self.slots.iter().map(Slot::report).collect()
    }

    pub fn failures(&self) -> Vec<ComponentFailure> {
        self.shared.supervisor().failures()
    }

    /// Wait for a stop request raised by the error policy or the network
    pub fn wait_for_stop_request(&self, timeout: Duration) -> bool {
        self.shared.supervisor().wait_for_stop_request(timeout)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop pipeline on drop: {}", e);
        }
        self.network = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("components", &self.slots.len())
            .field("event_channels", &self.event_channels.len())
            .field("running", &self.shared.is_running())
            .field("released", &self.released)
            .finish()
    }
}

fn init_hook(ctx: &ComponentContext, result: ComponentResult<()>) -> PipelineResult<()> {
    result.map_err(|e| PipelineError::Init {
        component: ctx.name().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentError, OutputSpec};
    use crate::event::Event;
    use crate::stream::Stream;
    use crate::types::SampleKind;

    struct Device;

    impl Sensor for Device {
        fn name(&self) -> &str {
            "device"
        }

        fn connect(&mut self, _ctx: &ComponentContext) -> ComponentResult<bool> {
            Ok(true)
        }
    }

    struct Samples(&'static str);

    impl Channel for Samples {
        fn name(&self) -> &str {
            self.0
        }

        fn describe_output(&self) -> StreamDescriptor {
            StreamDescriptor::new(SampleKind::F32, 2, 10.0)
        }

        fn process(&mut self, _ctx: &ComponentContext, _output: &mut Stream) -> ComponentResult<bool> {
            Ok(true)
        }
    }

    struct Passthrough;

    impl Transformer for Passthrough {
        fn name(&self) -> &str {
            "passthrough"
        }

        fn describe_output(&self, inputs: &[StreamDescriptor]) -> OutputSpec {
            OutputSpec::new(inputs[0].kind, inputs[0].dim)
        }

        fn transform(&mut self, _ctx: &ComponentContext, _inputs: &[Stream], _output: &mut Stream) -> ComponentResult<()> {
            Ok(())
        }
    }

    struct Sink;

    impl Consumer for Sink {
        fn name(&self) -> &str {
            "sink"
        }

        fn consume(&mut self, _ctx: &ComponentContext, _inputs: &[Stream], _event: Option<&Event>) -> ComponentResult<()> {
            Ok(())
        }
    }

    struct Listener;

    impl EventHandler for Listener {
        fn name(&self) -> &str {
            "listener"
        }

        fn notify(&mut self, _ctx: &ComponentContext, _event: &Event) -> ComponentResult<()> {
            Ok(())
        }
    }

    struct BadInit;

    impl Consumer for BadInit {
        fn name(&self) -> &str {
            "bad-init"
        }

        fn init(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
            Err(ComponentError::Config("missing model file".into()))
        }

        fn consume(&mut self, _ctx: &ComponentContext, _inputs: &[Stream], _event: Option<&Event>) -> ComponentResult<()> {
            Ok(())
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut p = pipeline();
        let (sensor, channel) = p.add_sensor(Device, Samples("samples")).unwrap();
        assert_eq!(sensor.component(), ComponentId(0));
        assert_eq!(channel, ComponentId(1));
        let t = p.add_transformer(Passthrough, &[channel], 1.0, 0.0).unwrap();
        assert_eq!(t, ComponentId(2));
        assert_eq!(p.len(), 3);
        assert_eq!(p.component_id("passthrough"), Some(t));
    }

    #[test]
    fn test_channel_buffer_sized_from_config() {
        let mut p = pipeline();
        let (_, channel) = p.add_sensor(Device, Samples("samples")).unwrap();
        let buffer = p.buffer(channel).unwrap();
        // 2 s at 10 Hz
        assert_eq!(buffer.capacity_samples(), 20);
        assert_eq!(buffer.bytes_per_sample(), 8);
    }

    #[test]
    fn test_transformer_output_rate() {
        let mut p = pipeline();
        let (_, channel) = p.add_sensor(Device, Samples("samples")).unwrap();
        let t = p.add_transformer(Passthrough, &[channel], 0.5, 0.0).unwrap();
        // 5 samples per 0.5 s frame
        assert_eq!(p.buffer(t).unwrap().sample_rate(), 10.0);
    }

    #[test]
    fn test_rejects_sources_without_output() {
        let mut p = pipeline();
        let (sensor, _) = p.add_sensor(Device, Samples("samples")).unwrap();
        let err = p.add_consumer(Sink, &[sensor.component()], 1.0, 0.0).unwrap_err();
        assert_eq!(err, PipelineError::SourceNotSetup(sensor.component()));

        let err = p.add_consumer(Sink, &[ComponentId(9)], 1.0, 0.0).unwrap_err();
        assert_eq!(err, PipelineError::UnknownComponent(ComponentId(9)));
    }

    #[test]
    fn test_rejects_invalid_windows() {
        let mut p = pipeline();
        let (_, channel) = p.add_sensor(Device, Samples("samples")).unwrap();
        assert!(matches!(
            p.add_consumer(Sink, &[channel], 0.0, 0.0),
            Err(PipelineError::InvalidWindow(_))
        ));
        assert!(matches!(
            p.add_consumer(Sink, &[channel], 0.01, 0.0),
            Err(PipelineError::InvalidWindow(_))
        ));
        // Larger than the 2 s buffer
        assert!(matches!(
            p.add_consumer(Sink, &[channel], 1.5, 1.0),
            Err(PipelineError::InvalidWindow(_))
        ));
        assert!(matches!(
            p.add_consumer(Sink, &[], 1.0, 0.0),
            Err(PipelineError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut p = pipeline();
        let (sensor, _) = p.add_sensor(Device, Samples("samples")).unwrap();
        let err = p.add_channel(sensor, Samples("samples")).unwrap_err();
        assert_eq!(err, PipelineError::DuplicateName("samples".into()));
        assert!(p.add_channel(sensor, Samples("more-samples")).is_ok());
    }

    #[test]
    fn test_init_failure_rejects_component() {
        let mut p = pipeline();
        let (_, channel) = p.add_sensor(Device, Samples("samples")).unwrap();
        let err = p.add_consumer(BadInit, &[channel], 1.0, 0.0).unwrap_err();
        assert!(matches!(err, PipelineError::Init { ref component, .. } if component == "bad-init"));
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_event_wiring() {
        let mut p = pipeline();
        let (_, channel) = p.add_sensor(Device, Samples("samples")).unwrap();
        let events = p.register_event_provider(channel).unwrap();
        assert!(Arc::ptr_eq(&events, &p.register_event_provider(channel).unwrap()));

        let handler = p.add_event_handler(Listener).unwrap();
        p.register_event_listener(handler, &events).unwrap();
        assert_eq!(events.listener_count(), 1);

        let consumer = p.add_event_consumer(Sink, &[channel], &events).unwrap();
        assert_eq!(events.listener_count(), 1);
        assert!(p.event_channel(channel).is_some());
        assert!(p.event_channel(consumer).is_none());
    }

    #[test]
    fn test_run_reset_clears_failed_sensor_link() {
        let mut p = pipeline();
        let (sensor, _) = p.add_sensor(Device, Samples("samples")).unwrap();
        let link = p.slots[sensor.component().index()].link.clone().unwrap();
        link.set(ConnectionStatus::Error);

        p.reset_for_run();
        assert_eq!(link.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut p = pipeline();
        p.add_sensor(Device, Samples("samples")).unwrap();
        assert!(p.stop().is_ok());
        assert!(!p.is_running());
    }

    #[test]
    fn test_clear_and_release() {
        let mut p = pipeline();
        p.add_sensor(Device, Samples("samples")).unwrap();
        p.clear().unwrap();
        assert!(p.is_empty());

        p.release().unwrap();
        assert!(p.is_released());
        assert_eq!(
            p.add_sensor(Device, Samples("samples")).unwrap_err(),
            PipelineError::Released
        );
        assert_eq!(p.start().unwrap_err(), PipelineError::Released);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = PipelineConfig {
            buffer_seconds: 0.0,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(config).is_err());
    }
}
