//! Error types for the ground station.

use crate::link::LinkError;
use crate::session::InvalidTransition;

#[derive(Debug, thiserror::Error)]
pub enum GroundError {
    /// Connecting to the drone failed. Fatal at startup.
    #[error("failed to connect to drone at {address}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading operator input failed.
    #[error("operator input failed")]
    Input(#[source] std::io::Error),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Session(#[from] InvalidTransition),
}
