//! # signal-fusion: soft real-time signal fusion runtime
//!
//! Independently clocked sources (sensors) produce sampled streams into
//! time-indexed ring buffers. Windowed transformers and consumers read
//! those buffers on their own fixed-phase schedules, and event channels
//! carry irregular, timestamped events between components. Several
//! pipeline instances on different hosts can start together and agree on
//! a shared virtual clock over UDP.
//!
//! ## Architecture
//!
//! - **Buffers**: [`buffer::TimeBuffer`] maps a logical sample index to a
//!   ring position; readers block until their window exists
//! - **Components**: one thread per component, driven by the runners in
//!   [`component`] through `enter` → loop → `flush`
//! - **Pipeline**: [`pipeline::Pipeline`] wires, starts and stops everything
//! - **Sync**: [`sync::NetworkSync`] runs the start/stop barrier and the
//!   NTP-style clock exchange on a tokio runtime
//!
//! ## Example
//!
//! ```ignore
//! use signal_fusion::components::{CollectingConsumer, SignalPattern, SignalSource};
//! use signal_fusion::{Pipeline, PipelineConfig};
//!
//! let mut pipeline = Pipeline::new(PipelineConfig::default())?;
//! let (sensor, channel) = SignalSource::new("imu", 40.0)
//!     .with_pattern(SignalPattern::default())
//!     .build();
//! let (_, imu) = pipeline.add_sensor(sensor, channel)?;
//!
//! let consumer = CollectingConsumer::new("collector");
//! let records = consumer.records();
//! pipeline.add_consumer(consumer, &[imu], 1.0, 0.0)?;
//!
//! pipeline.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! pipeline.stop()?;
//! println!("{} windows", records.len());
//! ```

pub mod buffer;
pub mod component;
pub mod components;
pub mod config;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod stop;
pub mod stream;
pub mod sync;
pub mod timer;
pub mod types;

// Re-export commonly used types
pub use buffer::{BufferError, TimeBuffer};
pub use component::{
    Channel, ComponentContext, ComponentError, ComponentResult, Consumer, EventHandler, OutputSpec,
    Sensor, Transformer,
};
pub use config::PipelineConfig;
pub use error::{FusionError, Result, ResultExt};
pub use event::{Event, EventChannel, EventPayload, EventState};
pub use pipeline::{ComponentId, Pipeline, PipelineError, SensorId};
pub use stop::StopSignal;
pub use stream::{Stream, StreamDescriptor};
pub use timer::{TickStatus, Timer};
pub use types::{ComponentReport, ComponentRole, ComponentState, ConnectionStatus, SampleKind};
