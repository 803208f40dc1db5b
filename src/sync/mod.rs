//! Network synchronisation between pipeline instances
//!
//! One instance is the master. It broadcasts start/stop datagrams and
//! answers clock requests; slaves wait for its start datagram and, in
//! continuous mode, periodically estimate their clock offset against it
//! with a minimum-round-trip, NTP-style exchange.

mod estimator;
mod network;
mod protocol;

pub use estimator::{ClockSample, OffsetEstimator};
pub use network::NetworkSync;
pub use protocol::{SyncMessage, REQUEST_TAG, START_TAG, STOP_TAG, TIME_TAG};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Malformed datagram: {0}")]
    Malformed(String),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Start barrier cancelled")]
    Cancelled,
}
