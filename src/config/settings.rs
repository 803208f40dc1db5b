//! Nested settings groups of the pipeline configuration
//!
//! # Main Types
//!
//! - [`WatchdogSettings`] - Stall detection and buffer re-anchoring
//! - [`SensorSettings`] - Connect backoff and update cadence
//! - [`SyncSettings`] - Network start barrier and clock synchronisation
//! - [`LoggingSettings`] - Log filter and optional log file (binary only)
//! - [`ErrorPolicy`] - What a fatal component error does to the pipeline

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Reaction to a fatal component error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ErrorPolicy {
    /// Record and log the failure, keep the other components running
    #[default]
    LogAndContinue,
    /// Raise a pipeline stop request
    StopPipeline,
}

/// Watchdog settings for channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogSettings {
    /// A channel that does not check in within this interval gets zero-filled
    pub watch_interval_ms: u64,
    /// Interval of buffer re-anchoring to the pipeline clock (0 disables)
    pub sync_interval_ms: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            watch_interval_ms: 1000,
            sync_interval_ms: 5000,
        }
    }
}

impl WatchdogSettings {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_ms > 0).then(|| Duration::from_millis(self.sync_interval_ms))
    }
}

/// Sensor connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettings {
    /// First retry delay after a failed connect
    pub retry_initial_ms: u64,
    /// Upper bound of the retry delay
    pub retry_max_ms: u64,
    /// Multiplier applied to the delay after each failure
    pub retry_factor: f64,
    /// Delay between `update` calls while connected
    pub update_interval_ms: u64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            retry_initial_ms: 250,
            retry_max_ms: 2000,
            retry_factor: 2.0,
            update_interval_ms: 10,
        }
    }
}

impl SensorSettings {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

/// How instances coordinate over the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncMode {
    /// Standalone instance
    #[default]
    None,
    /// Shared start/stop barrier only
    StartStop,
    /// Start/stop barrier plus periodic clock synchronisation
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SyncRole {
    #[default]
    Master,
    Slave,
}

/// Network synchronisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub mode: SyncMode,
    pub role: SyncRole,
    /// Address slaves send clock requests to
    pub master_host: IpAddr,
    /// Address the master sends start/stop datagrams to
    pub broadcast_addr: IpAddr,
    /// Port of the start/stop barrier
    pub start_port: u16,
    /// Port the master answers clock requests on
    pub clock_port: u16,
    /// Length of one clock sync interval
    pub interval_ms: u64,
    /// Requests sent per interval; the fastest reply wins
    pub requests_per_interval: u32,
    /// Times the master repeats the start datagram
    pub start_repeats: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            mode: SyncMode::None,
            role: SyncRole::Master,
            master_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            start_port: 55100,
            clock_port: 55101,
            interval_ms: 10_000,
            requests_per_interval: 5,
            start_repeats: 3,
        }
    }
}

impl SyncSettings {
    pub fn is_enabled(&self) -> bool {
        self.mode != SyncMode::None
    }

    pub fn is_master(&self) -> bool {
        self.role == SyncRole::Master
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn start_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.start_port)
    }

    pub fn clock_target(&self) -> SocketAddr {
        SocketAddr::new(self.master_host, self.clock_port)
    }
}

/// Logging settings, consumed by the binary when installing the subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, overrides `RUST_LOG` when set
    pub filter: Option<String>,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}
