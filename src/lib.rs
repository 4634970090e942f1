//! A simulated drone and ground control station talking over a deliberately noisy TCP link.
//!
//! The drone streams telemetry and acknowledges commands; the ground station sends operator
//! commands with bounded retry. Every byte on the link passes through a corrupting channel.

pub mod drone;
pub mod ground;
pub mod link;
pub mod log_sink;
pub mod session;
pub mod state_machine;
pub mod telemetry;

/// TCP port the drone listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 5000;
