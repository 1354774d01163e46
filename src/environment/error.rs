//! Environment error types

use thiserror::Error;

/// Error types for environment operations
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Failed to provision environment from image '{image}': {reason}")]
    Provision { image: String, reason: String },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to tear down environment '{id}': {reason}")]
    Teardown { id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
