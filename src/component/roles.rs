//! Role traits implemented by concrete components.
//!
//! Every hook gets the component's [`ComponentContext`]. Hooks with a
//! default body are optional.

use super::{ComponentContext, ComponentResult};
use crate::event::Event;
use crate::stream::{Stream, StreamDescriptor};
use crate::types::SampleKind;
use std::time::Duration;

/// A device connection owned by the pipeline.
///
/// The runner retries `connect` with backoff until it succeeds, then calls
/// `update` at the configured cadence. `update` returning `Ok(false)` means
/// the device was lost; the runner goes back to connecting.
pub trait Sensor: Send + 'static {
    fn name(&self) -> &str;

    /// Called once while wiring, before any thread exists
    fn init(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    /// Try to connect. `Ok(false)` means "not yet, retry later".
    fn connect(&mut self, ctx: &ComponentContext) -> ComponentResult<bool>;

    fn update(&mut self, _ctx: &ComponentContext) -> ComponentResult<bool> {
        Ok(true)
    }

    fn disconnect(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    fn on_connection_lost(&mut self, _ctx: &ComponentContext) {}
}

/// Produces raw samples from a connected sensor
pub trait Channel: Send + 'static {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    /// Shape of the produced stream; sizes the output buffer
    fn describe_output(&self) -> StreamDescriptor;

    /// Samples produced per `process` call
    fn samples_per_call(&self) -> usize {
        1
    }

    fn enter(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    /// Fill `output` with one call's worth of samples. `Ok(false)` means
    /// nothing was produced this time.
    fn process(&mut self, ctx: &ComponentContext, output: &mut Stream) -> ComponentResult<bool>;

    fn flush(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }
}

/// Output shape declared by a transformer; the rate follows from the frame
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub kind: SampleKind,
    pub dim: usize,
    pub labels: Vec<String>,
}

impl OutputSpec {
    pub fn new(kind: SampleKind, dim: usize) -> Self {
        Self {
            kind,
            dim,
            labels: Vec::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// Windowed computation from one or more streams into a new stream
pub trait Transformer: Send + 'static {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    fn describe_output(&self, inputs: &[StreamDescriptor]) -> OutputSpec;

    /// Output samples per call given each input's frame size in samples
    fn output_samples(&self, frames: &[usize]) -> usize {
        frames.first().copied().unwrap_or(1)
    }

    fn enter(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        Ok(())
    }

    fn transform(
        &mut self,
        ctx: &ComponentContext,
        inputs: &[Stream],
        output: &mut Stream,
    ) -> ComponentResult<()>;

    fn flush(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        Ok(())
    }
}

/// Terminal reader of one or more streams
pub trait Consumer: Send + 'static {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    fn enter(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        Ok(())
    }

    /// `trigger` is the event that bounded the window, for event-triggered consumers
    fn consume(
        &mut self,
        ctx: &ComponentContext,
        inputs: &[Stream],
        trigger: Option<&Event>,
    ) -> ComponentResult<()>;

    fn flush(&mut self, _ctx: &ComponentContext, _inputs: &[Stream]) -> ComponentResult<()> {
        Ok(())
    }
}

/// Reacts to events from the channels it listens on
pub trait EventHandler: Send + 'static {
    fn name(&self) -> &str;

    fn init(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    fn enter(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }

    fn notify(&mut self, ctx: &ComponentContext, event: &Event) -> ComponentResult<()>;

    /// Cadence of the free-running `process` loop, `None` for purely reactive handlers
    fn process_interval(&self) -> Option<Duration> {
        None
    }

    /// One free-running step. `Ok(false)` ends the loop.
    fn process(&mut self, _ctx: &ComponentContext) -> ComponentResult<bool> {
        Ok(false)
    }

    fn flush(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        Ok(())
    }
}
