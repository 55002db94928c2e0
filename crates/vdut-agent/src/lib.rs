//! vdut-agent: Lifecycle management for the agent under test
//!
//! Installs, probes and removes a systemd-managed agent on a device through
//! a [`RemoteChannel`](vdut_core::RemoteChannel), and prepares the device
//! environment once per run (DHCP unit patch, cached observability binary).

pub mod cache;
mod environment;
pub mod fetch;
pub mod manager;
pub mod steps;
pub mod units;

pub use cache::{ArtifactCache, ArtifactFetcher, DirCache};
pub use fetch::HttpFetcher;
pub use manager::AgentManager;
pub use steps::{Action, Severity, Step};
