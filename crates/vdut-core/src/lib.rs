//! vdut-core: Core abstractions and configuration for vdut
//!
//! This crate provides the shared types, the remote channel trait and the
//! configuration structures used by the device supervisor, the agent
//! lifecycle manager and the CLI.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{AgentError, ConfigError, DeviceError, RemoteError};
pub use traits::RemoteChannel;
pub use types::{AgentState, DeviceState};
