//! rally-core — configuration and the client wire protocol.
//! All other Rally crates depend on this one.

pub mod config;
pub mod wire;

pub use config::{ConfigError, GatewayConfig, NetworkConfig, RallyConfig};
pub use wire::{ClientEvent, ServerMessage, WireError};
