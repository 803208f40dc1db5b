//! Mock components for driving the pipeline into specific situations

use parking_lot::Mutex;
use signal_fusion::{
    Channel, ComponentContext, ComponentError, ComponentResult, Consumer, Event, EventHandler,
    OutputSpec, SampleKind, Stream, StreamDescriptor, Transformer,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One transformer call: samples per input and time of the first input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Call {
    pub samples: usize,
    pub time: f64,
}

/// Records every call and outputs the mean of the first input dimension
pub struct CountingTransformer {
    name: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CountingTransformer {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<Call>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl Transformer for CountingTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe_output(&self, _inputs: &[StreamDescriptor]) -> OutputSpec {
        OutputSpec::new(SampleKind::F64, 1)
    }

    fn output_samples(&self, _frames: &[usize]) -> usize {
        1
    }

    fn transform(&mut self, _ctx: &ComponentContext, inputs: &[Stream], output: &mut Stream) -> ComponentResult<()> {
        let input = &inputs[0];
        self.calls.lock().push(Call {
            samples: input.num_samples,
            time: input.time,
        });
        let n = input.num_samples.max(1) as f64;
        output.set_value(0, 0, input.channel_values(0).sum::<f64>() / n);
        Ok(())
    }
}

/// Channel that never produces a sample
pub struct SilentChannel {
    name: String,
}

impl SilentChannel {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }
}

impl Channel for SilentChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe_output(&self) -> StreamDescriptor {
        StreamDescriptor::new(SampleKind::F32, 1, 10.0)
    }

    fn process(&mut self, ctx: &ComponentContext, _output: &mut Stream) -> ComponentResult<bool> {
        ctx.sleep(Duration::from_millis(5));
        Ok(false)
    }
}

/// Channel that fails fatally on its `fail_at`-th call
pub struct FailingChannel {
    name: String,
    calls: u32,
    fail_at: u32,
}

impl FailingChannel {
    pub fn new(name: &str, fail_at: u32) -> Self {
        Self {
            name: name.to_string(),
            calls: 0,
            fail_at,
        }
    }
}

impl Channel for FailingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe_output(&self) -> StreamDescriptor {
        StreamDescriptor::new(SampleKind::F32, 1, 50.0)
    }

    fn process(&mut self, _ctx: &ComponentContext, _output: &mut Stream) -> ComponentResult<bool> {
        self.calls += 1;
        if self.calls >= self.fail_at {
            return Err(ComponentError::fatal("device returned garbage"));
        }
        Ok(true)
    }
}

/// Consumer that panics on its first window
pub struct PanickingConsumer;

impl Consumer for PanickingConsumer {
    fn name(&self) -> &str {
        "panicking"
    }

    fn consume(&mut self, _ctx: &ComponentContext, _inputs: &[Stream], _event: Option<&Event>) -> ComponentResult<()> {
        panic!("consumer bug");
    }
}

/// Consumer that blocks in `consume` without looking at the stop signal
pub struct StubbornConsumer {
    pub block_for: Duration,
}

impl Consumer for StubbornConsumer {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn consume(&mut self, _ctx: &ComponentContext, _inputs: &[Stream], _event: Option<&Event>) -> ComponentResult<()> {
        std::thread::sleep(self.block_for);
        Ok(())
    }
}

/// Free-running handler that steps `steps` times, then ends its loop
pub struct TickingHandler {
    interval: Duration,
    steps: u32,
    ticks: Arc<AtomicU32>,
}

impl TickingHandler {
    pub fn new(interval: Duration, steps: u32) -> (Self, Arc<AtomicU32>) {
        let ticks = Arc::new(AtomicU32::new(0));
        (
            Self {
                interval,
                steps,
                ticks: Arc::clone(&ticks),
            },
            ticks,
        )
    }
}

impl EventHandler for TickingHandler {
    fn name(&self) -> &str {
        "ticking"
    }

    fn notify(&mut self, _ctx: &ComponentContext, _event: &Event) -> ComponentResult<()> {
        Ok(())
    }

    fn process_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn process(&mut self, _ctx: &ComponentContext) -> ComponentResult<bool> {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(tick < self.steps)
    }
}
