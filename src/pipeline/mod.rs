//! Pipeline orchestrator.
//!
//! A [`Pipeline`] owns every component, the time buffers between them and
//! the event channels. Components are wired before the pipeline starts and
//! each runs on its own thread once it does:
//!
//! ```text
//! [Sensor] ─ link ─ [Channel] ──► TimeBuffer ──► [Transformer] ──► TimeBuffer ──► [Consumer]
//!                       │                                                  ▲
//!                   [Watchdog]                       EventChannel ─────────┘
//! ```
//!
//! # Design
//!
//! - **Insertion order is topological order**: wiring rejects a component
//!   whose sources are not set up yet.
//! - **Explicit context**: components reach shared state through
//!   [`PipelineShared`] in their context, there is no global instance.
//! - **Cooperative close**: `stop()` closes buffers first, then asks every
//!   component to finish and detaches threads that miss the close timeout.

mod clock;
mod error;
mod executor;
mod id;
mod shared;
mod supervisor;

pub use clock::PipelineClock;
pub use error::{PipelineError, PipelineResult};
pub use executor::Pipeline;
pub use id::{ComponentId, SensorId};
pub use shared::PipelineShared;
pub use supervisor::{ComponentFailure, Supervisor, FAILURE_HISTORY};
