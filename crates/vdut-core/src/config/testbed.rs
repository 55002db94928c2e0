//! Top-level test run configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::{AgentConfig, ConnectionParams, DeviceConfig, EnvironmentConfig};

/// Configuration for one orchestrated test run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    /// Maximum time to wait for the device to answer over SSH
    #[serde(with = "duration_secs")]
    pub ready_timeout: Duration,

    /// Bound for each teardown step (uninstall, stop)
    #[serde(with = "duration_secs")]
    pub teardown_timeout: Duration,

    /// Hold the device for inspection when the test body fails
    pub keep_on_failure: bool,

    /// Emulated device
    pub device: DeviceConfig,

    /// SSH credentials; host/port are taken from the device when it is
    /// started by vdut
    pub connection: ConnectionParams,

    /// Agent under test
    pub agent: AgentConfig,

    /// Environment preparation
    pub environment: EnvironmentConfig,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(300),
            teardown_timeout: Duration::from_secs(120),
            keep_on_failure: false,
            device: DeviceConfig::default(),
            connection: ConnectionParams::default(),
            agent: AgentConfig::default(),
            environment: EnvironmentConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TestbedConfig::default();
        assert_eq!(config.ready_timeout, Duration::from_secs(300));
        assert_eq!(config.teardown_timeout, Duration::from_secs(120));
        assert!(!config.keep_on_failure);
    }

    #[test]
    fn test_toml_sections() {
        let config: TestbedConfig = toml::from_str(
            r#"
keep_on_failure = true

[connection]
username = "netops"
timeout = 10

[agent.layout]
name = "fabricd"

[environment.alloy]
enabled = false
"#,
        )
        .unwrap();

        assert!(config.keep_on_failure);
        assert_eq!(config.connection.username, "netops");
        assert_eq!(config.connection.timeout, Duration::from_secs(10));
        assert_eq!(config.agent.layout.binary_path(), "/opt/netagent/bin/fabricd");
        assert!(!config.environment.alloy.enabled);
    }
}
