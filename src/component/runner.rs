//! Thread bodies for every component role.
//!
//! A [`Runner`] owns the boxed component plus its wiring (buffers, sensor
//! link, trigger channel). The pipeline moves it into the component thread
//! and gets it back through the `JoinHandle`, so the same component can be
//! started again after a stop.

use super::{
    Backoff, Channel, ComponentContext, ComponentError, ComponentResult, Consumer, EventHandler,
    SensorLink, Sensor, Transformer,
};
use crate::buffer::{BufferError, TimeBuffer};
use crate::component::lifecycle::LogThrottle;
use crate::error::panic_message;
use crate::event::{Event, EventChannel, EventListener};
use crate::stream::Stream;
use crate::timer::{TickStatus, Timer};
use crate::types::{ComponentState, ConnectionStatus};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Poll slice of event-triggered consumers waiting for the next event
const EVENT_POLL: Duration = Duration::from_millis(100);

/// One upstream buffer and the window read from it per iteration
#[derive(Debug, Clone)]
pub(crate) struct Source {
    pub buffer: Arc<TimeBuffer>,
    /// Samples the read position advances per iteration
    pub frame: usize,
    /// Extra samples read past the frame
    pub delta: usize,
}

pub(crate) struct SensorRunner {
    pub sensor: Box<dyn Sensor>,
    pub link: SensorLink,
}

pub(crate) struct ChannelRunner {
    pub channel: Box<dyn Channel>,
    pub link: SensorLink,
    pub buffer: Arc<TimeBuffer>,
    /// Watchdog check-in, installed for each run
    pub checkin: Option<Sender<()>>,
}

pub(crate) struct TransformerRunner {
    pub transformer: Box<dyn Transformer>,
    pub sources: Vec<Source>,
    pub output: Arc<TimeBuffer>,
    pub frame_secs: f64,
    pub output_samples: usize,
}

pub(crate) enum Trigger {
    Timed { frame_secs: f64 },
    Event(Arc<EventChannel>),
}

pub(crate) struct ConsumerRunner {
    pub consumer: Box<dyn Consumer>,
    pub sources: Vec<Source>,
    pub trigger: Trigger,
}

pub(crate) struct HandlerRunner {
    pub handler: Arc<Mutex<Box<dyn EventHandler>>>,
}

pub(crate) enum Runner {
    Sensor(SensorRunner),
    Channel(ChannelRunner),
    Transformer(TransformerRunner),
    Consumer(ConsumerRunner),
    EventHandler(HandlerRunner),
}

impl Runner {
    fn run(&mut self, ctx: &ComponentContext) -> ComponentResult<()> {
        match self {
            Runner::Sensor(r) => run_sensor(r, ctx),
            Runner::Channel(r) => run_channel(r, ctx),
            Runner::Transformer(r) => run_transformer(r, ctx),
            Runner::Consumer(r) => run_consumer(r, ctx),
            Runner::EventHandler(r) => run_handler(r, ctx),
        }
    }
}

/// Component thread entry point. Every exit path, panics included, ends
/// with `finish` so the pipeline's close wait observes it.
pub(crate) fn run_component(mut runner: Runner, ctx: Arc<ComponentContext>) -> Runner {
    let flags = ctx.flags();
    if flags.is_terminate_requested() {
        flags.set_state(ComponentState::CloseRequested);
    } else {
        flags.set_state(ComponentState::Running);
    }
    debug!(component = %ctx.name(), role = %ctx.role(), "Component thread started");

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| runner.run(&ctx)));
    let supervisor = ctx.shared().supervisor();
    let state = match outcome {
        Ok(Ok(())) if !flags.has_failed() => ComponentState::Terminated,
        Ok(Ok(())) => ComponentState::Dead,
        Ok(Err(e)) => {
            supervisor.report(ctx.name(), e.to_string(), true);
            ComponentState::Dead
        }
        Err(payload) => {
            supervisor.report(
                ctx.name(),
                format!("panicked: {}", panic_message(payload.as_ref())),
                true,
            );
            ComponentState::Dead
        }
    };

    if state == ComponentState::Dead {
        match &mut runner {
            Runner::Sensor(r) => r.link.set(ConnectionStatus::Error),
            Runner::Channel(r) => r.checkin = None,
            _ => {}
        }
    }

    flags.finish(state);
    info!(
        component = %ctx.name(),
        state = %flags.state(),
        iterations = ctx.stats().iterations(),
        "Component thread finished"
    );
    runner
}

/// Count a soft failure and report it, throttled
fn soft_failure(ctx: &ComponentContext, throttle: &mut LogThrottle, hook: &str, err: &ComponentError) {
    let failures = ctx.stats().record_failure();
    if throttle.should_log() {
        ctx.shared().supervisor().report(
            ctx.name(),
            format!("{} failed ({} failures so far): {}", hook, failures, err),
            false,
        );
    }
}

/// `enter` outcome: fatal errors abort the component, others are logged
fn check_enter(ctx: &ComponentContext, result: ComponentResult<()>) -> ComponentResult<()> {
    match result {
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(component = %ctx.name(), "enter failed: {}", e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

/// Combine the loop outcome with the `flush` outcome
fn after_flush(
    ctx: &ComponentContext,
    outcome: ComponentResult<()>,
    flush: ComponentResult<()>,
) -> ComponentResult<()> {
    if let Err(e) = flush {
        if e.is_fatal() && outcome.is_ok() {
            return Err(e);
        }
        warn!(component = %ctx.name(), "flush failed: {}", e);
    }
    outcome
}

fn record_tick(ctx: &ComponentContext, status: TickStatus) -> bool {
    match status {
        TickStatus::Stopped => false,
        TickStatus::Late { .. } => {
            ctx.stats().record_late_tick();
            true
        }
        TickStatus::OnTime => true,
    }
}

// ── Sensor ──

fn run_sensor(r: &mut SensorRunner, ctx: &ComponentContext) -> ComponentResult<()> {
    let settings = ctx.config().sensor.clone();
    let mut backoff = Backoff::from_settings(&settings);
    let mut throttle = LogThrottle::default();
    let mut connected = false;
    r.link.set(ConnectionStatus::Connecting);

    let outcome = loop {
        if ctx.is_stopping() {
            break Ok(());
        }

        if !connected {
            match r.sensor.connect(ctx) {
                Ok(true) => {
                    connected = true;
                    backoff.reset();
                    r.link.set(ConnectionStatus::Connected);
                    info!(component = %ctx.name(), "Sensor connected");
                    continue;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => break Err(e),
                Err(e) => soft_failure(ctx, &mut throttle, "connect", &e),
            }
            let delay = backoff.next_delay();
            trace!(component = %ctx.name(), delay_ms = delay.as_millis() as u64, "Connect retry");
            if ctx.stop_signal().wait_timeout(delay) {
                break Ok(());
            }
            continue;
        }

        match r.sensor.update(ctx) {
            Ok(true) => ctx.stats().record_iteration(),
            Ok(false) => {
                warn!(component = %ctx.name(), "Sensor connection lost, reconnecting");
                connected = false;
                r.sensor.on_connection_lost(ctx);
                r.link.set(ConnectionStatus::Connecting);
                continue;
            }
            Err(e) if e.is_fatal() => break Err(e),
            Err(e) => soft_failure(ctx, &mut throttle, "update", &e),
        }
        if ctx.stop_signal().wait_timeout(settings.update_interval()) {
            break Ok(());
        }
    };

    if connected {
        if let Err(e) = r.sensor.disconnect(ctx) {
            warn!(component = %ctx.name(), "disconnect failed: {}", e);
        }
    }
    r.link.set(if outcome.is_err() {
        ConnectionStatus::Error
    } else {
        ConnectionStatus::Disconnected
    });
    outcome
}

// ── Channel ──

fn run_channel(r: &mut ChannelRunner, ctx: &ComponentContext) -> ComponentResult<()> {
    let connect_timeout = ctx.config().sensor_connect_timeout();
    if !r.link.wait_connected(connect_timeout, ctx.stop_signal()) {
        r.checkin = None;
        if ctx.is_stopping() {
            return Ok(());
        }
        return Err(ComponentError::fatal(format!(
            "sensor not connected within {:?} (status {})",
            connect_timeout,
            r.link.status()
        )));
    }

    if let Err(e) = check_enter(ctx, r.channel.enter(ctx)) {
        r.checkin = None;
        return Err(e);
    }

    let outcome = if ctx.wait_until_running() {
        channel_loop(r, ctx)
    } else {
        Ok(())
    };
    // Dropping the sender releases the watchdog.
    r.checkin = None;
    let flush = r.channel.flush(ctx);
    after_flush(ctx, outcome, flush)
}

fn channel_loop(r: &mut ChannelRunner, ctx: &ComponentContext) -> ComponentResult<()> {
    let descriptor = r.buffer.descriptor().clone();
    let per_call = r.channel.samples_per_call().max(1);
    let mut stream = Stream::new(descriptor.clone(), per_call);
    let mut timer = Timer::from_secs(per_call as f64 / descriptor.sample_rate);
    let watch_interval = ctx.config().watchdog.watch_interval();
    let mut throttle = LogThrottle::default();
    timer.reset();

    while !ctx.is_stopping() {
        if r.link.is_connected() {
            stream.time = r.buffer.last_sample_time();
            match r.channel.process(ctx, &mut stream) {
                Ok(true) => {
                    r.buffer.push_stream(&stream);
                    if let Some(checkin) = &r.checkin {
                        let _ = checkin.try_send(());
                    }
                    ctx.stats().record_iteration();
                }
                Ok(false) => {
                    ctx.stats().record_failure();
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => soft_failure(ctx, &mut throttle, "process", &e),
            }
        } else {
            ctx.stats().record_failure();
        }

        match timer.sync(ctx.stop_signal()) {
            TickStatus::Stopped => break,
            TickStatus::Late { missed_by } => {
                ctx.stats().record_late_tick();
                // The watchdog has zero-filled the gap, don't burst to catch up.
                if missed_by >= watch_interval {
                    timer.reset();
                }
            }
            TickStatus::OnTime => {}
        }
    }
    Ok(())
}

// ── Windowed readers ──

/// Per-source read positions and the streams they are read into
struct Windows {
    sources: Vec<Source>,
    positions: Vec<i64>,
    inputs: Vec<Stream>,
}

impl Windows {
    fn new(sources: &[Source]) -> Self {
        let inputs = sources
            .iter()
            .map(|s| Stream::new(s.buffer.descriptor().clone(), s.frame + s.delta))
            .collect();
        Self {
            sources: sources.to_vec(),
            positions: vec![0; sources.len()],
            inputs,
        }
    }

    fn inputs(&self) -> &[Stream] {
        &self.inputs
    }

    /// Read the current window of every source. An evicted source jumps
    /// to its oldest retained sample.
    fn read(&mut self, ctx: &ComponentContext) -> Result<(), BufferError> {
        for (i, source) in self.sources.iter().enumerate() {
            let result = source.buffer.get_stream_interruptible(
                &mut self.inputs[i],
                self.positions[i],
                ctx.stop_signal(),
            );
            if let Err(err) = result {
                if let BufferError::Evicted { oldest, .. } = err {
                    self.positions[i] = oldest - source.frame as i64;
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn advance(&mut self) {
        for (position, source) in self.positions.iter_mut().zip(&self.sources) {
            *position += source.frame as i64;
        }
    }

    /// Read the samples covering [`time`, `time + duration`) of every source
    fn read_span(&mut self, ctx: &ComponentContext, time: f64, duration: f64) -> Result<(), BufferError> {
        for (source, input) in self.sources.iter().zip(self.inputs.iter_mut()) {
            let rate = source.buffer.sample_rate();
            let start = (time * rate).round() as i64;
            let samples = ((duration * rate).round() as usize).max(1);
            if samples > source.buffer.capacity_samples() {
                return Err(BufferError::ExceedsCapacity {
                    requested: samples,
                    capacity: source.buffer.capacity_samples(),
                });
            }
            input.resize(samples);
            source
                .buffer
                .get_stream_interruptible(input, start, ctx.stop_signal())?;
        }
        Ok(())
    }
}

/// Shared loop of time-triggered transformers and consumers
fn timed_loop<F, S>(
    ctx: &ComponentContext,
    frame_secs: f64,
    windows: &mut Windows,
    mut step: F,
    mut on_skip: S,
) -> ComponentResult<()>
where
    F: FnMut(&[Stream]) -> ComponentResult<()>,
    S: FnMut(),
{
    let mut timer = Timer::from_secs(frame_secs);
    let mut throttle = LogThrottle::default();
    timer.reset();

    while !ctx.is_stopping() {
        match windows.read(ctx) {
            Ok(()) => match step(windows.inputs()) {
                Ok(()) => ctx.stats().record_iteration(),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => soft_failure(ctx, &mut throttle, "loop", &e),
            },
            Err(BufferError::Closed) => break,
            Err(e) => {
                soft_failure(ctx, &mut throttle, "read", &ComponentError::from(e));
                on_skip();
            }
        }
        windows.advance();

        if !record_tick(ctx, timer.sync(ctx.stop_signal())) {
            break;
        }
    }
    Ok(())
}

// ── Transformer ──

fn run_transformer(r: &mut TransformerRunner, ctx: &ComponentContext) -> ComponentResult<()> {
    let mut windows = Windows::new(&r.sources);
    let mut output = Stream::new(r.output.descriptor().clone(), r.output_samples);
    check_enter(ctx, r.transformer.enter(ctx, windows.inputs()))?;

    let outcome = if ctx.wait_until_running() {
        let transformer = &mut r.transformer;
        let buffer = &r.output;
        let skip_samples = r.output_samples;
        timed_loop(
            ctx,
            r.frame_secs,
            &mut windows,
            |inputs| {
                transformer.transform(ctx, inputs, &mut output)?;
                output.time = inputs.first().map(|s| s.time).unwrap_or_default();
                buffer.push_stream(&output);
                Ok(())
            },
            // Keep the output aligned with the frame grid.
            || buffer.push_zeroes(skip_samples),
        )
    } else {
        Ok(())
    };

    let flush = r.transformer.flush(ctx, windows.inputs());
    after_flush(ctx, outcome, flush)
}

// ── Consumer ──

fn run_consumer(r: &mut ConsumerRunner, ctx: &ComponentContext) -> ComponentResult<()> {
    let mut windows = Windows::new(&r.sources);
    check_enter(ctx, r.consumer.enter(ctx, windows.inputs()))?;

    let outcome = if !ctx.wait_until_running() {
        Ok(())
    } else {
        match &r.trigger {
            Trigger::Timed { frame_secs } => {
                let consumer = &mut r.consumer;
                timed_loop(
                    ctx,
                    *frame_secs,
                    &mut windows,
                    |inputs| consumer.consume(ctx, inputs, None),
                    || {},
                )
            }
            Trigger::Event(channel) => event_loop(ctx, channel, &mut windows, r.consumer.as_mut()),
        }
    };

    let flush = r.consumer.flush(ctx, windows.inputs());
    after_flush(ctx, outcome, flush)
}

fn event_loop(
    ctx: &ComponentContext,
    channel: &EventChannel,
    windows: &mut Windows,
    consumer: &mut dyn Consumer,
) -> ComponentResult<()> {
    let mut next_id = 0u64;
    let mut throttle = LogThrottle::default();

    while !ctx.is_stopping() {
        let Some(event) = channel.get_event_timeout(next_id, EVENT_POLL) else {
            if channel.is_closed() {
                break;
            }
            continue;
        };
        next_id = event.id + 1;
        ctx.stats().record_event();
        if !event.is_complete_span() {
            continue;
        }

        match windows.read_span(ctx, event.time(), event.duration()) {
            Ok(()) => match consumer.consume(ctx, windows.inputs(), Some(&event)) {
                Ok(()) => ctx.stats().record_iteration(),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => soft_failure(ctx, &mut throttle, "consume", &e),
            },
            Err(BufferError::Closed) => break,
            Err(e) => soft_failure(ctx, &mut throttle, "read", &ComponentError::from(e)),
        }
    }
    Ok(())
}

// ── Event handler ──

fn run_handler(r: &mut HandlerRunner, ctx: &ComponentContext) -> ComponentResult<()> {
    check_enter(ctx, r.handler.lock().enter(ctx))?;
    let interval = r.handler.lock().process_interval();

    let outcome = match interval {
        Some(period) if ctx.wait_until_running() => {
            let mut timer = Timer::new(period);
            let mut throttle = LogThrottle::default();
            timer.reset();
            loop {
                if ctx.is_stopping() {
                    break Ok(());
                }
                let step = r.handler.lock().process(ctx);
                match step {
                    Ok(true) => ctx.stats().record_iteration(),
                    Ok(false) => break Ok(()),
                    Err(e) if e.is_fatal() => break Err(e),
                    Err(e) => soft_failure(ctx, &mut throttle, "process", &e),
                }
                if !record_tick(ctx, timer.sync(ctx.stop_signal())) {
                    break Ok(());
                }
            }
        }
        _ => {
            ctx.stop_signal().wait();
            Ok(())
        }
    };

    let flush = r.handler.lock().flush(ctx);
    after_flush(ctx, outcome, flush)
}

/// Delivers channel events to an [`EventHandler`] while its component runs
pub(crate) struct HandlerListener {
    pub handler: Arc<Mutex<Box<dyn EventHandler>>>,
    pub ctx: Arc<ComponentContext>,
}

impl EventListener for HandlerListener {
    fn notify(&self, event: &Arc<Event>) {
        let ctx = &self.ctx;
        if ctx.flags().state() != ComponentState::Running || ctx.is_stopping() {
            return;
        }
        ctx.stats().record_event();
        match self.handler.lock().notify(ctx, event) {
            Ok(()) => {}
            Err(e) if e.is_fatal() => {
                ctx.shared().supervisor().report(ctx.name(), e.to_string(), true);
                ctx.flags().mark_failed();
                ctx.stop_signal().stop();
            }
            Err(e) => warn!(component = %ctx.name(), event = %event.name, "notify failed: {}", e),
        }
    }
}
