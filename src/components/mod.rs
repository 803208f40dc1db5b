//! Built-in components
//!
//! Reference implementations of every role, used by the demo binary and
//! the integration tests:
//!
//! - [`SignalSource`] - simulated sensor and channel producing waveforms
//! - [`FrameStats`] - per-frame mean/min/max/energy transformer
//! - [`CollectingConsumer`] / [`LogConsumer`] - terminal consumers
//! - [`ThresholdDetector`] / [`EventLog`] - event producer and handler

mod signal;
mod sinks;
mod stats;
mod threshold;

pub use signal::{DeviceMonitor, SignalChannel, SignalPattern, SignalSensor, SignalSource, Stall};
pub use sinks::{CollectingConsumer, LogConsumer, Records, WindowRecord};
pub use stats::FrameStats;
pub use threshold::{EventLog, EventRecords, ThresholdDetector};
