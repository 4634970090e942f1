//! Error types for the drone node.

use crate::link::LinkError;
use crate::session::InvalidTransition;

/// Rejections produced while interpreting a command line. The line is still acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// `GOTO` without exactly three finite numbers after it.
    #[error("invalid GOTO format: {line:?}")]
    InvalidGoto { line: String },
}

/// Failures that end a drone session or prevent it from starting.
#[derive(Debug, thiserror::Error)]
pub enum DroneError {
    /// Binding the listening socket failed. Fatal at startup.
    #[error("failed to listen on {address}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting the ground station's connection failed.
    #[error("failed to accept connection")]
    Accept(#[source] std::io::Error),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Session(#[from] InvalidTransition),
}
