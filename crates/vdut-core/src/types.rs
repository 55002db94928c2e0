//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a supervised device process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// No process has been launched yet
    Unstarted,
    /// Process launched, remote shell not answering yet
    Starting,
    /// Readiness probe succeeded
    Ready,
    /// Graceful shutdown in progress
    Stopping,
    /// Process has exited (stopped or crashed)
    Stopped,
}

impl DeviceState {
    /// Whether a process is expected to be alive in this state
    pub fn is_live(&self) -> bool {
        matches!(self, DeviceState::Starting | DeviceState::Ready)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Unstarted => "unstarted",
            DeviceState::Starting => "starting",
            DeviceState::Ready => "ready",
            DeviceState::Stopping => "stopping",
            DeviceState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Installation state of the agent on the device
///
/// Always derived from live probes, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentState {
    /// Agent binary is absent
    NotInstalled,
    /// Binary present, service not active
    InstalledStopped,
    /// Binary present and service active
    InstalledRunning {
        /// Matching process line, when it could be read
        #[serde(skip_serializing_if = "Option::is_none")]
        process: Option<String>,
    },
}

impl AgentState {
    /// Whether the agent binary is present
    pub fn is_installed(&self) -> bool {
        !matches!(self, AgentState::NotInstalled)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::NotInstalled => write!(f, "not installed"),
            AgentState::InstalledStopped => write!(f, "installed (stopped)"),
            AgentState::InstalledRunning { process: Some(p) } => {
                write!(f, "installed (running: {})", p)
            }
            AgentState::InstalledRunning { process: None } => write!(f, "installed (running)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_state_json() {
        let state = AgentState::InstalledRunning {
            process: Some("812 /opt/netagent/bin/netagent".to_string()),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(
            json,
            r#"{"state":"installed_running","process":"812 /opt/netagent/bin/netagent"}"#
        );

        let json = serde_json::to_string(&AgentState::NotInstalled).unwrap();
        assert_eq!(json, r#"{"state":"not_installed"}"#);
    }

    #[test]
    fn test_agent_state_installed() {
        assert!(!AgentState::NotInstalled.is_installed());
        assert!(AgentState::InstalledStopped.is_installed());
        assert!(AgentState::InstalledRunning { process: None }.is_installed());
    }

    #[test]
    fn test_device_state_live() {
        assert!(DeviceState::Starting.is_live());
        assert!(DeviceState::Ready.is_live());
        assert!(!DeviceState::Stopped.is_live());
        assert_eq!(DeviceState::Stopping.to_string(), "stopping");
    }
}
