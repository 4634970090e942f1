use thiserror::Error;

/// Errors raised by the corrupting byte-stream link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The corruption rate must be a probability.
    #[error("corruption rate {0} is outside [0, 1]")]
    InvalidCorruptionRate(f64),

    /// The underlying transport failed.
    #[error("transport error")]
    Io(#[from] std::io::Error),

    /// The session was closed while an operation was in progress.
    #[error("link closed")]
    Closed,
}
