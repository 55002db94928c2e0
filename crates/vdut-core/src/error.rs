//! Core error types for vdut

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Virtual device supervisor errors
#[derive(Error, Debug)]
pub enum DeviceError {
    /// A required image file is missing from the working directory
    #[error("Required image not found: {}", path.display())]
    MissingImage { path: PathBuf },

    /// Start was called while a process handle is present
    #[error("Device '{0}' is already running")]
    AlreadyRunning(String),

    /// The hypervisor process could not be launched
    #[error("Failed to launch {}: {source}", binary.display())]
    Launch {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No live process to operate on
    #[error("Device '{0}' is not running")]
    NotRunning(String),

    /// The device never answered the readiness probe
    #[error("Device not ready after {timeout:?} ({attempts} attempts)")]
    ReadinessTimeout { timeout: Duration, attempts: u32 },

    /// The hypervisor process could not be reaped
    #[error("Failed to reap hypervisor process: {0}")]
    Reap(String),

    /// I/O error while preparing the run directory
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Remote command channel errors
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Private key file not found or unreadable
    #[error("Private key not found at {}: {reason}", path.display())]
    KeyNotFound { path: PathBuf, reason: String },

    /// TCP/SSH connection could not be established
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    /// Public key authentication was rejected
    #[error("Authentication rejected for user '{0}'")]
    AuthRejected(String),

    /// The call exceeded its own timeout
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The remote command exited with a non-zero status
    ///
    /// The captured output is kept so allow-failure call sites can inspect it.
    #[error("Command `{command}` exited with status {status}")]
    ExitStatus {
        command: String,
        status: u32,
        output: String,
    },

    /// SSH protocol error after the connection was established
    #[error("SSH error: {0}")]
    Ssh(String),

    /// File transfer failed
    #[error("Transfer of {} to {remote} failed: {reason}", local.display())]
    Transfer {
        local: PathBuf,
        remote: String,
        reason: String,
    },

    /// Fewer bytes reached the remote side than the local file holds
    #[error("Short write to {remote}: expected {expected} bytes, wrote {written}")]
    ShortWrite {
        remote: String,
        expected: u64,
        written: u64,
    },
}

impl RemoteError {
    /// Output captured before the failure, if any
    pub fn output(&self) -> Option<&str> {
        match self {
            RemoteError::ExitStatus { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Remote exit status, if the command ran to completion
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            RemoteError::ExitStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Agent lifecycle errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// The local agent binary does not exist
    #[error("Agent binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// A fatal lifecycle step failed
    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: RemoteError,
    },

    /// A remote probe failed for a reason other than a negative answer
    #[error("Probe '{probe}' failed: {source}")]
    Probe {
        probe: String,
        #[source]
        source: RemoteError,
    },

    /// The re-probe after an action shows it did not converge
    #[error("Verification failed: {0}")]
    Verification(String),

    /// Download of an auxiliary artifact failed
    #[error("Download failed: {0}")]
    Download(String),

    /// Host-local artifact cache error
    #[error("Artifact cache error: {0}")]
    Cache(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
