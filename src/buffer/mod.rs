//! Time-indexed circular sample buffers
//!
//! Every provider (channel or transformer) writes its output into one
//! [`TimeBuffer`]. Downstream components read windows by logical sample
//! index; the buffer blocks readers until the requested range has been
//! written, and reports eviction instead of returning overwritten data.

mod time_buffer;

pub use time_buffer::{BufferError, TimeBuffer};
