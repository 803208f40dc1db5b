//! Error handling for signal-fusion
//!
//! This module defines the crate-wide error type and a Result alias.
//! Each subsystem has its own narrower error enum (`PipelineError`,
//! `BufferError`, `ComponentError`, `SyncError`); they all convert into
//! [`FusionError`] so application code can use a single `?` chain.

use crate::buffer::BufferError;
use crate::component::ComponentError;
use crate::pipeline::PipelineError;
use crate::sync::SyncError;
use thiserror::Error;

/// Main error type for signal-fusion operations
#[derive(Error, Debug)]
pub enum FusionError {
    /// Wiring or lifecycle errors raised by the pipeline orchestrator
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// A time buffer access that could not complete
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Errors raised by a component hook
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// Network clock synchronisation errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FusionError>,
    },
}

impl FusionError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FusionError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Result type alias for signal-fusion operations
pub type Result<T> = std::result::Result<T, FusionError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<FusionError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
