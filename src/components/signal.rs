//! Simulated sensor producing deterministic waveforms.
//!
//! A [`SignalSource`] describes the device and builds the sensor/channel
//! pair that gets wired with `Pipeline::add_sensor`. Each output dimension
//! follows its own [`SignalPattern`]:
//!
//! - [`SignalPattern::Constant`] - Fixed value
//! - [`SignalPattern::Sine`] - Sinusoidal wave with frequency/amplitude/offset
//! - [`SignalPattern::Counter`] - Incrementing counter with wrap-around
//! - [`SignalPattern::Sawtooth`] - Linear ramp that resets every period
//! - [`SignalPattern::Square`] - Alternates between ±amplitude
//! - [`SignalPattern::Triangle`] - Triangle wave
//!
//! The device can refuse its first connection attempts, drop its connection
//! once, and stall once for a given duration, which is how the pipeline's
//! backoff, reconnect and watchdog paths are exercised.
//!
//! # Example
//!
//! ```ignore
//! let (sensor, channel) = SignalSource::new("imu", 40.0)
//!     .with_pattern(SignalPattern::Sine { frequency: 1.0, amplitude: 1.0, offset: 0.0 })
//!     .with_pattern(SignalPattern::Counter { step: 1.0, min: 0.0, max: 100.0 })
//!     .build();
//! pipeline.add_sensor(sensor, channel)?;
//! ```

use crate::component::{Channel, ComponentContext, ComponentResult, Sensor};
use crate::stream::{Stream, StreamDescriptor};
use crate::types::SampleKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Waveform of one output dimension
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalPattern {
    Constant(f64),
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Advances by `step` every sample
    Counter { step: f64, min: f64, max: f64 },
    Sawtooth { period: f64, amplitude: f64 },
    Square { period: f64, amplitude: f64 },
    Triangle { period: f64, amplitude: f64 },
}

impl Default for SignalPattern {
    fn default() -> Self {
        SignalPattern::Sine {
            frequency: 1.0,
            amplitude: 1.0,
            offset: 0.0,
        }
    }
}

/// A pattern plus the state it needs between samples
#[derive(Debug, Clone)]
struct Generator {
    pattern: SignalPattern,
    counter: f64,
}

impl Generator {
    fn new(pattern: SignalPattern) -> Self {
        let counter = match pattern {
            SignalPattern::Counter { min, step, .. } => min - step,
            _ => 0.0,
        };
        Self { pattern, counter }
    }

    fn reset(&mut self) {
        *self = Self::new(self.pattern);
    }

    fn value(&mut self, t: f64) -> f64 {
        match self.pattern {
            SignalPattern::Constant(v) => v,
            SignalPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            SignalPattern::Counter { step, min, max } => {
                self.counter += step;
                if self.counter > max {
                    self.counter = min;
                } else if self.counter < min {
                    self.counter = max;
                }
                self.counter
            }
            SignalPattern::Sawtooth { period, amplitude } => amplitude * (t.rem_euclid(period) / period),
            SignalPattern::Square { period, amplitude } => {
                if t.rem_euclid(period) < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            SignalPattern::Triangle { period, amplitude } => {
                let t = t.rem_euclid(period);
                let half = period / 2.0;
                if t < half {
                    amplitude * (2.0 * t / half - 1.0)
                } else {
                    amplitude * (1.0 - 2.0 * (t - half) / half)
                }
            }
        }
    }
}

/// One stall of the channel: once the pipeline clock passes `after`
/// seconds, `process` blocks for `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stall {
    pub after: f64,
    pub duration: Duration,
}

/// Device state shared by the sensor and its channel
#[derive(Debug, Default)]
struct Device {
    connected: AtomicBool,
    connect_attempts: AtomicU32,
    updates: AtomicU32,
    losses: AtomicU32,
}

/// Read-only view of a simulated device, usable after the sensor moved
/// into the pipeline
#[derive(Debug, Clone)]
pub struct DeviceMonitor(Arc<Device>);

impl DeviceMonitor {
    pub fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::Acquire)
    }

    pub fn connect_attempts(&self) -> u32 {
        self.0.connect_attempts.load(Ordering::Acquire)
    }

    /// Times the sensor runner reported the connection lost
    pub fn connection_losses(&self) -> u32 {
        self.0.losses.load(Ordering::Acquire)
    }
}

/// Builder of a simulated sensor/channel pair
#[derive(Debug, Clone)]
pub struct SignalSource {
    name: String,
    sample_rate: f64,
    kind: SampleKind,
    patterns: Vec<SignalPattern>,
    labels: Vec<String>,
    samples_per_call: usize,
    connect_failures: u32,
    dropout_after: Option<u32>,
    stall: Option<Stall>,
}

impl SignalSource {
    pub fn new(name: impl Into<String>, sample_rate: f64) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            kind: SampleKind::F32,
            patterns: Vec::new(),
            labels: Vec::new(),
            samples_per_call: 1,
            connect_failures: 0,
            dropout_after: None,
            stall: None,
        }
    }

    /// Add one output dimension following `pattern`
    pub fn with_pattern(mut self, pattern: SignalPattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_kind(mut self, kind: SampleKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_samples_per_call(mut self, samples: usize) -> Self {
        self.samples_per_call = samples.max(1);
        self
    }

    /// Refuse the first `attempts` connection attempts
    pub fn with_connect_failures(mut self, attempts: u32) -> Self {
        self.connect_failures = attempts;
        self
    }

    /// Lose the connection once, on the `updates`-th sensor update
    pub fn with_dropout(mut self, updates: u32) -> Self {
        self.dropout_after = Some(updates.max(1));
        self
    }

    pub fn with_stall(mut self, after: f64, duration: Duration) -> Self {
        self.stall = Some(Stall { after, duration });
        self
    }

    pub fn build(self) -> (SignalSensor, SignalChannel) {
        let device = Arc::new(Device::default());
        let patterns = if self.patterns.is_empty() {
            vec![SignalPattern::default()]
        } else {
            self.patterns
        };
        let descriptor = StreamDescriptor::new(self.kind, patterns.len(), self.sample_rate)
            .with_labels(self.labels);

        let sensor = SignalSensor {
            name: format!("{}-device", self.name),
            device: Arc::clone(&device),
            connect_failures: self.connect_failures,
            dropout_after: self.dropout_after,
        };
        let channel = SignalChannel {
            name: self.name,
            descriptor,
            generators: patterns.into_iter().map(Generator::new).collect(),
            samples_per_call: self.samples_per_call,
            stall: self.stall,
            stalled: false,
            device,
        };
        (sensor, channel)
    }
}

/// Connection side of a simulated device
pub struct SignalSensor {
    name: String,
    device: Arc<Device>,
    connect_failures: u32,
    dropout_after: Option<u32>,
}

impl SignalSensor {
    /// Connection attempts made so far
    pub fn connect_attempts(&self) -> u32 {
        self.device.connect_attempts.load(Ordering::Acquire)
    }

    pub fn monitor(&self) -> DeviceMonitor {
        DeviceMonitor(Arc::clone(&self.device))
    }
}

impl Sensor for SignalSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self, _ctx: &ComponentContext) -> ComponentResult<bool> {
        let attempt = self.device.connect_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        if attempt <= self.connect_failures {
            debug!(sensor = %self.name, attempt, "Simulated device refused connection");
            return Ok(false);
        }
        self.device.connected.store(true, Ordering::Release);
        Ok(true)
    }

    fn update(&mut self, _ctx: &ComponentContext) -> ComponentResult<bool> {
        let update = self.device.updates.fetch_add(1, Ordering::AcqRel) + 1;
        if self.dropout_after == Some(update) {
            info!(sensor = %self.name, update, "Simulated connection drop");
            self.device.connected.store(false, Ordering::Release);
            return Ok(false);
        }
        Ok(true)
    }

    fn disconnect(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        self.device.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn on_connection_lost(&mut self, _ctx: &ComponentContext) {
        self.device.losses.fetch_add(1, Ordering::AcqRel);
    }
}

/// Sampling side of a simulated device
pub struct SignalChannel {
    name: String,
    descriptor: StreamDescriptor,
    generators: Vec<Generator>,
    samples_per_call: usize,
    stall: Option<Stall>,
    stalled: bool,
    device: Arc<Device>,
}

impl Channel for SignalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe_output(&self) -> StreamDescriptor {
        self.descriptor.clone()
    }

    fn samples_per_call(&self) -> usize {
        self.samples_per_call
    }

    fn enter(&mut self, _ctx: &ComponentContext) -> ComponentResult<()> {
        self.generators.iter_mut().for_each(Generator::reset);
        self.stalled = false;
        Ok(())
    }

    fn process(&mut self, ctx: &ComponentContext, output: &mut Stream) -> ComponentResult<bool> {
        if !self.device.connected.load(Ordering::Acquire) {
            return Ok(false);
        }

        if let Some(stall) = self.stall {
            if !self.stalled && ctx.time() >= stall.after {
                self.stalled = true;
                info!(channel = %self.name, duration_ms = stall.duration.as_millis() as u64, "Simulated stall");
                if !ctx.sleep(stall.duration) {
                    return Ok(false);
                }
            }
        }

        let rate = self.descriptor.sample_rate;
        for sample in 0..output.num_samples {
            let t = output.time + sample as f64 / rate;
            for (dim, generator) in self.generators.iter_mut().enumerate() {
                output.set_value(sample, dim, generator.value(t));
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_wraps() {
        let mut gen = Generator::new(SignalPattern::Counter {
            step: 1.0,
            min: 0.0,
            max: 2.0,
        });
        let values: Vec<f64> = (0..5).map(|i| gen.value(i as f64)).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_square_and_sawtooth() {
        let mut square = Generator::new(SignalPattern::Square {
            period: 1.0,
            amplitude: 2.0,
        });
        assert_eq!(square.value(0.25), 2.0);
        assert_eq!(square.value(0.75), -2.0);

        let mut saw = Generator::new(SignalPattern::Sawtooth {
            period: 2.0,
            amplitude: 4.0,
        });
        assert!((saw.value(1.0) - 2.0).abs() < 1e-9);
        assert!((saw.value(3.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_triangle_peaks() {
        let mut tri = Generator::new(SignalPattern::Triangle {
            period: 2.0,
            amplitude: 1.0,
        });
        assert!((tri.value(0.0) + 1.0).abs() < 1e-9);
        assert!((tri.value(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sine_offset() {
        let mut sine = Generator::new(SignalPattern::Sine {
            frequency: 1.0,
            amplitude: 2.0,
            offset: 5.0,
        });
        assert!((sine.value(0.25) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_build_describes_one_dimension_per_pattern() {
        let (sensor, channel) = SignalSource::new("imu", 40.0)
            .with_pattern(SignalPattern::Constant(1.0))
            .with_pattern(SignalPattern::Constant(2.0))
            .with_pattern(SignalPattern::Constant(3.0))
            .with_labels(["x", "y", "z"])
            .build();
        let descriptor = channel.describe_output();
        assert_eq!(descriptor.dim, 3);
        assert_eq!(descriptor.sample_rate, 40.0);
        assert_eq!(descriptor.label(2), "z");
        assert_eq!(sensor.name(), "imu-device");
        assert_eq!(sensor.connect_attempts(), 0);
    }

    #[test]
    fn test_default_pattern_when_none_given() {
        let (_, channel) = SignalSource::new("plain", 10.0).build();
        assert_eq!(channel.describe_output().dim, 1);
    }
}
