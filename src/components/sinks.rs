//! Terminal consumers: in-memory collection and logging.

use crate::component::{ComponentContext, ComponentError, ComponentResult, Consumer};
use crate::event::Event;
use crate::stream::Stream;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// One window received by a [`CollectingConsumer`]
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    /// Time of the first sample of the first source
    pub time: f64,
    /// Samples per source
    pub samples: Vec<usize>,
    /// Values of every source, widened to f64, sample-major
    pub values: Vec<Vec<f64>>,
    /// Triggering event of event-driven consumers
    pub event: Option<Event>,
}

impl WindowRecord {
    /// True if every value of every source is zero
    pub fn is_all_zero(&self) -> bool {
        self.values.iter().flatten().all(|v| *v == 0.0)
    }
}

#[derive(Debug, Default)]
struct Collected {
    windows: Vec<WindowRecord>,
    entered: u32,
    flushed: u32,
}

/// Handle to what a [`CollectingConsumer`] recorded; stays readable after
/// the consumer moved into the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Records(Arc<Mutex<Collected>>);

impl Records {
    pub fn len(&self) -> usize {
        self.0.lock().windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn windows(&self) -> Vec<WindowRecord> {
        self.0.lock().windows.clone()
    }

    /// How many times `enter` ran
    pub fn entered(&self) -> u32 {
        self.0.lock().entered
    }

    /// How many times `flush` ran
    pub fn flushed(&self) -> u32 {
        self.0.lock().flushed
    }

    pub fn clear(&self) {
        self.0.lock().windows.clear();
    }
}

/// Records every window it consumes
#[derive(Debug)]
pub struct CollectingConsumer {
    name: String,
    records: Records,
    limit: Option<usize>,
}

impl CollectingConsumer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Records::default(),
            limit: None,
        }
    }

    /// Keep at most `limit` windows, dropping the oldest
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn records(&self) -> Records {
        self.records.clone()
    }
}

impl Consumer for CollectingConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn enter(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        self.records.0.lock().entered += 1;
        Ok(())
    }

    fn consume(&mut self, _ctx: &ComponentContext, inputs: &[Stream], event: Option<&Event>) -> ComponentResult<()> {
        let record = WindowRecord {
            time: inputs.first().map(|s| s.time).unwrap_or_default(),
            samples: inputs.iter().map(|s| s.num_samples).collect(),
            values: inputs
                .iter()
                .map(|s| {
                    (0..s.num_samples)
                        .flat_map(|i| (0..s.dim()).filter_map(move |d| s.value(i, d)))
                        .collect()
                })
                .collect(),
            event: event.cloned(),
        };
        let mut collected = self.records.0.lock();
        collected.windows.push(record);
        if let Some(limit) = self.limit {
            let excess = collected.windows.len().saturating_sub(limit);
            collected.windows.drain(..excess);
        }
        Ok(())
    }

    fn flush(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        self.records.0.lock().flushed += 1;
        Ok(())
    }
}

/// Logs a one-line summary of every `every`-th window
#[derive(Debug, Clone)]
pub struct LogConsumer {
    name: String,
    every: u64,
    count: u64,
}

impl LogConsumer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            every: 1,
            count: 0,
        }
    }

    pub fn every(mut self, every: u64) -> Self {
        self.every = every.max(1);
        self
    }
}

impl Consumer for LogConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    fn consume(&mut self, _ctx: &ComponentContext, inputs: &[Stream], event: Option<&Event>) -> ComponentResult<()> {
        self.count += 1;
        if (self.count - 1) % self.every != 0 {
            return Ok(());
        }
        let first = inputs
            .first()
            .ok_or_else(|| ComponentError::Config("log consumer has no inputs".into()))?;
        let values: Vec<String> = (0..first.dim())
            .filter_map(|d| first.value(first.num_samples.saturating_sub(1), d))
            .map(|v| format!("{:.3}", v))
            .collect();
        info!(
            consumer = %self.name,
            window = self.count,
            time = first.time,
            samples = first.num_samples,
            event = event.map(|e| e.name.as_str()).unwrap_or("-"),
            "latest [{}]",
            values.join(", ")
        );
        Ok(())
    }
}
