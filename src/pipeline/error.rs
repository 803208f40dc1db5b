//! Pipeline-specific error types.

use crate::pipeline::id::ComponentId;
use thiserror::Error;

/// Wiring and lifecycle errors raised by the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Unknown component {0:?}")]
    UnknownComponent(ComponentId),

    #[error("Source {0:?} is not set up or does not provide a stream")]
    SourceNotSetup(ComponentId),

    #[error("Component name '{0}' is already in use")]
    DuplicateName(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Pipeline is running")]
    Running,

    #[error("Pipeline has been released")]
    Released,

    #[error("Component '{component}' failed to initialise: {message}")]
    Init { component: String, message: String },

    #[error("Component '{0}' was lost by a previous run and cannot be restarted")]
    ComponentLost(String),

    #[error("Failed to spawn thread for '{component}': {message}")]
    Spawn { component: String, message: String },

    #[error("Start barrier failed: {0}")]
    StartBarrier(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
