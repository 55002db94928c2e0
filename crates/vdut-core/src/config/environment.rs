//! Test environment preparation settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings for the one-time environment preparation step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// DHCP client unit to replace with a oneshot variant
    pub dhcp_unit: String,

    /// Interface the DHCP client runs on
    pub dhcp_interface: String,

    /// systemd unit directory on the device
    pub unit_dir: String,

    /// Observability binary to provision
    pub alloy: AlloyConfig,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            dhcp_unit: "dhclient.service".to_string(),
            dhcp_interface: "eth0".to_string(),
            unit_dir: "/etc/systemd/system".to_string(),
            alloy: AlloyConfig::default(),
        }
    }
}

impl EnvironmentConfig {
    pub fn dhcp_unit_path(&self) -> String {
        format!("{}/{}", self.unit_dir, self.dhcp_unit)
    }
}

/// Grafana Alloy download and install settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlloyConfig {
    /// Skip provisioning entirely when false
    pub enabled: bool,

    /// Release version, also the cache key
    pub version: String,

    /// Archive URL; `{version}` is substituted
    pub url_template: String,

    /// Substring identifying the binary inside the archive
    pub entry_pattern: String,

    /// Install path on the device
    pub remote_path: String,

    /// Host-local cache directory
    pub cache_dir: PathBuf,
}

impl Default for AlloyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            version: "v1.5.1".to_string(),
            url_template:
                "http://github.com/grafana/alloy/releases/download/{version}/alloy-linux-amd64.zip"
                    .to_string(),
            entry_pattern: "alloy-linux-amd64".to_string(),
            remote_path: "/usr/local/bin/alloy".to_string(),
            cache_dir: super::default_cache_dir(),
        }
    }
}

impl AlloyConfig {
    /// Download URL for a given version
    pub fn download_url(&self, version: &str) -> String {
        self.url_template.replace("{version}", version)
    }

    /// Version as printed by `alloy --version` (no leading `v`)
    pub fn bare_version(&self) -> &str {
        self.version.trim_start_matches('v')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_url() {
        let alloy = AlloyConfig::default();
        assert_eq!(
            alloy.download_url("v1.5.1"),
            "http://github.com/grafana/alloy/releases/download/v1.5.1/alloy-linux-amd64.zip"
        );
    }

    #[test]
    fn test_bare_version() {
        let alloy = AlloyConfig {
            version: "v1.4.0".to_string(),
            ..AlloyConfig::default()
        };
        assert_eq!(alloy.bare_version(), "1.4.0");
    }

    #[test]
    fn test_dhcp_unit_path() {
        let env = EnvironmentConfig::default();
        assert_eq!(env.dhcp_unit_path(), "/etc/systemd/system/dhclient.service");
    }
}
