//! Error types of the mapping engine

use crate::controller::SamplerError;
use thiserror::Error;

/// Problems found while turning binding documents into bindings.
/// The offending binding is skipped, the rest of the table loads.
#[derive(Debug, Error)]
pub enum BindingError {
    /// Required field missing or contradictory
    #[error("Malformed binding '{name}': {reason}")]
    MalformedBinding { name: String, reason: String },

    /// Button, axis or chair command name not recognised
    #[error("Binding '{name}' targets something unknown: {reason}")]
    ActionTargetInvalid { name: String, reason: String },
}

impl BindingError {
    pub fn malformed(name: &str, reason: impl Into<String>) -> Self {
        BindingError::MalformedBinding {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_target(name: &str, reason: impl Into<String>) -> Self {
        BindingError::ActionTargetInvalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors that stop the engine from starting or shutting down cleanly
#[derive(Debug, Error)]
pub enum EngineError {
    /// The virtual gamepad could not be acquired; nothing runs without it
    #[error("Virtual gamepad unavailable: {0}")]
    GamepadUnavailable(String),

    #[error("Input sampler failed: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Engine task failed: {0}")]
    Thread(String),
}
