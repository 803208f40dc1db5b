//! Threshold events: a detector that emits spans and a handler that logs them.

use crate::component::{ComponentContext, ComponentResult, Consumer, EventHandler};
use crate::event::{Event, EventPayload, EventState};
use crate::stream::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct Span {
    start: f64,
    peak: f64,
}

/// Emits a `Start` event when one dimension rises to the threshold and a
/// `Complete` event covering the whole span when it falls below again.
///
/// Needs an outgoing event channel (`Pipeline::register_event_provider`).
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    name: String,
    event_name: String,
    dim: usize,
    threshold: f64,
    active: Option<Span>,
    last_time: f64,
}

impl ThresholdDetector {
    pub fn new(name: impl Into<String>, dim: usize, threshold: f64) -> Self {
        let name = name.into();
        Self {
            event_name: format!("{}-crossing", name),
            name,
            dim,
            threshold,
            active: None,
            last_time: 0.0,
        }
    }

    pub fn with_event_name(mut self, event_name: impl Into<String>) -> Self {
        self.event_name = event_name.into();
        self
    }

    fn complete(&mut self, ctx: &ComponentContext, end: f64) {
        let Some(span) = self.active.take() else {
            return;
        };
        let start_ms = (span.start * 1000.0).round() as i64;
        let end_ms = (end * 1000.0).round() as i64;
        let event = Event::new(&self.event_name, start_ms)
            .with_state(EventState::Complete)
            .with_duration_ms((end_ms - start_ms).clamp(0, u32::MAX as i64) as u32)
            .with_payload(EventPayload::Floats(vec![span.peak as f32]));
        if ctx.emit(event).is_none() {
            debug!(detector = %self.name, "No outgoing event channel");
        }
    }
}

impl Consumer for ThresholdDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        self.active = None;
        self.last_time = 0.0;
        Ok(())
    }

    fn consume(&mut self, ctx: &ComponentContext, inputs: &[Stream], _event: Option<&Event>) -> ComponentResult<()> {
        let Some(input) = inputs.first() else {
            return Ok(());
        };
        let rate = input.sample_rate();
        for (i, value) in input.channel_values(self.dim).enumerate() {
            let t = input.time + i as f64 / rate;
            self.last_time = t;
            match self.active.as_mut() {
                None if value >= self.threshold => {
                    self.active = Some(Span { start: t, peak: value });
                    let event = Event::new(&self.event_name, (t * 1000.0).round() as i64)
                        .with_state(EventState::Start);
                    ctx.emit(event);
                }
                Some(span) if value >= self.threshold => span.peak = span.peak.max(value),
                Some(_) => self.complete(ctx, t),
                None => {}
            }
        }
        Ok(())
    }

    fn flush(&mut self, ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        let end = self.last_time;
        self.complete(ctx, end);
        Ok(())
    }
}

/// Events received by an [`EventLog`]
#[derive(Debug, Clone, Default)]
pub struct EventRecords(Arc<Mutex<Vec<Event>>>);

impl EventRecords {
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }
}

/// Logs and keeps every event it is notified of, optionally logging a
/// periodic summary from its free-running loop.
#[derive(Debug)]
pub struct EventLog {
    name: String,
    records: EventRecords,
    summary_interval: Option<Duration>,
}

impl EventLog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: EventRecords::default(),
            summary_interval: None,
        }
    }

    pub fn with_summary_interval(mut self, interval: Duration) -> Self {
        self.summary_interval = Some(interval);
        self
    }

    pub fn records(&self) -> EventRecords {
        self.records.clone()
    }
}

impl EventHandler for EventLog {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&mut self, _ctx: &ComponentContext, event: &Event) -> ComponentResult<()> {
        info!(
            handler = %self.name,
            id = event.id,
            sender = %event.sender,
            event = %event.name,
            state = ?event.state,
            time_ms = event.time_ms,
            duration_ms = event.duration_ms,
            "Event"
        );
        self.records.0.lock().push(event.clone());
        Ok(())
    }

    fn process_interval(&self) -> Option<Duration> {
        self.summary_interval
    }

    fn process(&mut self, ctx: &ComponentContext) -> ComponentResult<bool> {
        info!(handler = %self.name, events = self.records.len(), time = ctx.time(), "Event summary");
        Ok(true)
    }
}
