//! Component roles and their runtime
//!
//! A pipeline is built from components, each playing one role:
//!
//! - [`Sensor`] - owns a device connection
//! - [`Channel`] - turns a connected sensor into a sampled stream
//! - [`Transformer`] - windowed computation from streams to a new stream
//! - [`Consumer`] - terminal windowed reader, timed or event-triggered
//! - [`EventHandler`] - reacts to events, optionally free running
//!
//! Every component runs on its own thread. The runner drives the hooks in
//! `enter` → loop → `flush` order and classifies hook errors with
//! [`ComponentError`]: fatal errors end the component's thread, everything
//! else is logged and the loop continues.

mod connection;
mod context;
mod lifecycle;
mod roles;
pub(crate) mod runner;
pub(crate) mod watchdog;

pub use connection::{Backoff, SensorLink};
pub use context::ComponentContext;
pub use lifecycle::{ComponentStats, LifecycleFlags};
pub use roles::{Channel, Consumer, EventHandler, OutputSpec, Sensor, Transformer};

use crate::buffer::BufferError;
use thiserror::Error;

/// Error returned by a component hook
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    /// Unrecoverable; ends this component's thread
    #[error("fatal: {0}")]
    Fatal(String),

    /// Logged, the iteration is skipped and the loop continues
    #[error("{0}")]
    Recoverable(String),

    /// Nothing to do this iteration (missing upstream data)
    #[error("no data: {0}")]
    NoData(String),

    /// Invalid component configuration, raised from `init`
    #[error("configuration: {0}")]
    Config(String),
}

impl ComponentError {
    pub fn fatal(message: impl Into<String>) -> Self {
        ComponentError::Fatal(message.into())
    }

    pub fn recoverable(message: impl Into<String>) -> Self {
        ComponentError::Recoverable(message.into())
    }

    /// Whether the error ends the component
    pub fn is_fatal(&self) -> bool {
        matches!(self, ComponentError::Fatal(_) | ComponentError::Config(_))
    }
}

impl From<BufferError> for ComponentError {
    fn from(err: BufferError) -> Self {
        ComponentError::NoData(err.to_string())
    }
}

/// Result type of component hooks
pub type ComponentResult<T> = std::result::Result<T, ComponentError>;
