//! Remote shell connection parameters

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Parameters for reaching a device over SSH
///
/// Host keys are never verified: targets are ephemeral, loopback-forwarded
/// instances with no stable identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Host to connect to
    pub host: String,

    /// TCP port of the SSH service
    pub port: u16,

    /// Username for public key authentication
    pub username: String,

    /// Path to the private key
    pub private_key_path: PathBuf,

    /// Per-call timeout covering connect, auth and the command itself
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Timeout for a single file transfer
    #[serde(with = "duration_secs")]
    pub transfer_timeout: Duration,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2222,
            username: "admin".to_string(),
            private_key_path: dirs::home_dir()
                .unwrap_or_default()
                .join(".ssh")
                .join("id_ed25519"),
            timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(300),
        }
    }
}

impl ConnectionParams {
    /// `host:port` string for the SSH service
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Copy of these parameters pointed at a loopback-forwarded port
    pub fn forwarded(&self, port: u16) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port,
            ..self.clone()
        }
    }
}
