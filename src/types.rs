//! Core data types for signal-fusion
//!
//! This module contains the small value types shared by every layer of the
//! runtime: sample element types, sensor connection status, component
//! lifecycle state and per-component statistics.
//!
//! # Main Types
//!
//! - [`SampleKind`] - Element type of a stream (i16, f32, ...)
//! - [`ConnectionStatus`] - Device connection state machine of a sensor
//! - [`ComponentState`] - Lifecycle state of a pipeline component
//! - [`ComponentRole`] - Which role a component plays in the pipeline
//! - [`ComponentReport`] - Snapshot of a component's statistics

use serde::{Deserialize, Serialize};

/// Element type of the samples carried by a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SampleKind {
    /// 8-bit unsigned integer
    U8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 32-bit floating point
    #[default]
    F32,
    /// 64-bit floating point
    F64,
}

impl SampleKind {
    /// Returns the size in bytes of one value of this kind
    pub fn size_bytes(&self) -> usize {
        match self {
            SampleKind::U8 => 1,
            SampleKind::I16 => 2,
            SampleKind::I32 | SampleKind::F32 => 4,
            SampleKind::I64 | SampleKind::F64 => 8,
        }
    }

    /// Parse one little-endian value into a f64
    pub fn parse_to_f64(&self, bytes: &[u8]) -> Option<f64> {
        if bytes.len() < self.size_bytes() {
            return None;
        }

        Some(match self {
            SampleKind::U8 => bytes[0] as f64,
            SampleKind::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            SampleKind::I32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            SampleKind::F32 => {
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64
            }
            SampleKind::I64 => i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as f64,
            SampleKind::F64 => f64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
        })
    }
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleKind::U8 => write!(f, "u8"),
            SampleKind::I16 => write!(f, "i16"),
            SampleKind::I32 => write!(f, "i32"),
            SampleKind::I64 => write!(f, "i64"),
            SampleKind::F32 => write!(f, "f32"),
            SampleKind::F64 => write!(f, "f64"),
        }
    }
}

/// Connection status of a sensor device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected to the device
    #[default]
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and delivering data
    Connected,
    /// Gave up after a fatal connect error
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Lifecycle state of a component thread
///
/// ```text
/// Idle ──► Running ──► CloseRequested ──► Terminated
///             │               └─────────► Forced
///             └──► Dead (fatal error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentState {
    /// Wired but no thread running
    #[default]
    Idle,
    /// Thread is executing its lifecycle hooks
    Running,
    /// Terminate flag set, waiting for the thread to acknowledge
    CloseRequested,
    /// Thread acknowledged termination and exited
    Terminated,
    /// Thread did not acknowledge within the close timeout and was detached
    Forced,
    /// Thread exited because of a fatal error
    Dead,
}

impl ComponentState {
    pub(crate) fn to_u8(self) -> u8 {
        match self {
            ComponentState::Idle => 0,
            ComponentState::Running => 1,
            ComponentState::CloseRequested => 2,
            ComponentState::Terminated => 3,
            ComponentState::Forced => 4,
            ComponentState::Dead => 5,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ComponentState::Running,
            2 => ComponentState::CloseRequested,
            3 => ComponentState::Terminated,
            4 => ComponentState::Forced,
            5 => ComponentState::Dead,
            _ => ComponentState::Idle,
        }
    }

    /// Whether the thread has finished (normally or not)
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ComponentState::Terminated | ComponentState::Forced | ComponentState::Dead
        )
    }
}

impl std::fmt::Display for ComponentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentState::Idle => write!(f, "idle"),
            ComponentState::Running => write!(f, "running"),
            ComponentState::CloseRequested => write!(f, "closing"),
            ComponentState::Terminated => write!(f, "terminated"),
            ComponentState::Forced => write!(f, "forced"),
            ComponentState::Dead => write!(f, "dead"),
        }
    }
}

/// The role a component plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRole {
    Sensor,
    Channel,
    Transformer,
    Consumer,
    EventHandler,
}

impl ComponentRole {
    /// Whether components of this role own an output time buffer
    pub fn is_provider(&self) -> bool {
        matches!(self, ComponentRole::Channel | ComponentRole::Transformer)
    }
}

impl std::fmt::Display for ComponentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentRole::Sensor => write!(f, "sensor"),
            ComponentRole::Channel => write!(f, "channel"),
            ComponentRole::Transformer => write!(f, "transformer"),
            ComponentRole::Consumer => write!(f, "consumer"),
            ComponentRole::EventHandler => write!(f, "event handler"),
        }
    }
}

/// Snapshot of a component's runtime statistics
#[derive(Debug, Clone, Default)]
pub struct ComponentReport {
    pub name: String,
    pub role: Option<ComponentRole>,
    pub state: ComponentState,
    /// Number of successful main-loop iterations
    pub iterations: u64,
    /// Number of iterations that failed (missing data, recoverable errors)
    pub failed_iterations: u64,
    /// Number of timer ticks the component arrived late for
    pub late_ticks: u64,
    /// Samples zero-filled by the watchdog (channels only)
    pub zero_filled_samples: u64,
    /// Events delivered to the component
    pub events_handled: u64,
}

impl ComponentReport {
    /// Calculate the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.iterations + self.failed_iterations;
        if total == 0 {
            100.0
        } else {
            (self.iterations as f64 / total as f64) * 100.0
        }
    }

    /// Whether the component is falling behind its schedule
    pub fn is_falling_behind(&self) -> bool {
        self.late_ticks > 0 && self.late_ticks * 10 > self.iterations
    }
}
