//! Immutable event records passed over event channels.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Phase of an event that spans time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EventState {
    Start,
    Continue,
    #[default]
    Complete,
}

/// Data attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum EventPayload {
    #[default]
    Empty,
    Text(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Bool(bool),
    Map(BTreeMap<String, String>),
}

/// A timestamped record with an id assigned by the channel it is pushed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic per-channel id, 0 until pushed
    pub id: u64,
    /// Name of the component that emitted the event
    pub sender: String,
    pub name: String,
    /// Virtual-clock time of the event start, milliseconds
    pub time_ms: i64,
    pub duration_ms: u32,
    pub state: EventState,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(name: impl Into<String>, time_ms: i64) -> Self {
        Self {
            id: 0,
            sender: String::new(),
            name: name.into(),
            time_ms,
            duration_ms: 0,
            state: EventState::Complete,
            payload: EventPayload::Empty,
        }
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u32) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_state(mut self, state: EventState) -> Self {
        self.state = state;
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Start time in seconds
    pub fn time(&self) -> f64 {
        self.time_ms as f64 / 1000.0
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// A completed event covering a non-empty time span
    pub fn is_complete_span(&self) -> bool {
        self.state == EventState::Complete && self.duration_ms > 0
    }
}
