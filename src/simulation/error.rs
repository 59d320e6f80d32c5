//! Error types for the simulation kernel.

use thiserror::Error;

use crate::simulation::states::Snapshot;

#[derive(Debug, Error)]
pub enum NBodyError {
    /// Invalid or missing parameter; raised before the run starts
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Distinct bodies that could not be separated at the depth cap
    #[error("tree construction failed at depth {depth}: bodies {bodies:?} are closer than the cell resolution")]
    TreeConstruction { bodies: Vec<usize>, depth: usize },

    /// The tree walk never reached the leaf holding this body
    #[error("malformed tree: body {body} is unreachable from the root")]
    MalformedTree { body: usize },

    /// NaN/Inf in the state; `last_valid` is the state before the failing step
    #[error("non-finite state for body {body} in step {step}")]
    IntegrationFatal {
        step: u64,
        body: usize,
        last_valid: Box<Snapshot>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, NBodyError>;

/// Shorthand used by the validators
pub(crate) fn config_err<T>(msg: impl Into<String>) -> Result<T> {
    Err(NBodyError::Configuration(msg.into()))
}
