//! vdut-device: Supervisor for one emulated network device
//!
//! Launches QEMU with a fixed topology, watches the process from a
//! background task, polls the remote shell for readiness and shuts the
//! process down gracefully or by force.

pub mod instance;
mod monitor;
pub mod qemu;
mod readiness;

pub use instance::DeviceInstance;
pub use monitor::ProcessExit;
pub use qemu::ImageFormat;
