//! Virtual device configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;

/// Guest port of the remote shell service
pub const GUEST_SSH_PORT: u16 = 22;

/// Guest port of the management protocol endpoint
pub const GUEST_MGMT_PORT: u16 = 8080;

const DEFAULT_MEMORY_MIB: u32 = 4096;
const DEFAULT_CPUS: u32 = 4;
const DEFAULT_SSH_PORT: u16 = 2222;
const DEFAULT_MGMT_PORT: u16 = 8080;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for one emulated network device
///
/// Zero-valued memory, CPU count and ports are replaced with defaults by
/// [`DeviceConfig::with_defaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Instance name, used for the QEMU `-name` and the run directory
    pub name: String,

    /// Directory holding the disk and firmware images
    pub work_dir: PathBuf,

    /// Disk image file name inside `work_dir`
    pub disk_image: String,

    /// EFI code firmware file name inside `work_dir`
    pub efi_code: String,

    /// EFI variable store file name inside `work_dir`
    pub efi_vars: String,

    /// Guest memory in MiB
    pub memory_mib: u32,

    /// Number of virtual CPUs
    pub cpus: u32,

    /// Host port forwarded to the guest SSH port
    pub ssh_port: u16,

    /// Host port forwarded to the guest management port
    pub mgmt_port: u16,

    /// Hypervisor binary
    pub hypervisor: PathBuf,

    /// QEMU machine specification
    pub machine: String,

    /// Interval between readiness probes
    #[serde(with = "duration_millis")]
    pub ready_poll_interval: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "vdut".to_string(),
            work_dir: PathBuf::from("."),
            disk_image: "device.qcow2".to_string(),
            efi_code: "OVMF_CODE.fd".to_string(),
            efi_vars: "OVMF_VARS.fd".to_string(),
            memory_mib: DEFAULT_MEMORY_MIB,
            cpus: DEFAULT_CPUS,
            ssh_port: DEFAULT_SSH_PORT,
            mgmt_port: DEFAULT_MGMT_PORT,
            hypervisor: PathBuf::from("qemu-system-x86_64"),
            machine: "q35,accel=kvm".to_string(),
            ready_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DeviceConfig {
    /// Replace zero-valued sizing, port and interval fields with defaults
    pub fn with_defaults(mut self) -> Self {
        if self.memory_mib == 0 {
            self.memory_mib = DEFAULT_MEMORY_MIB;
        }
        if self.cpus == 0 {
            self.cpus = DEFAULT_CPUS;
        }
        if self.ssh_port == 0 {
            self.ssh_port = DEFAULT_SSH_PORT;
        }
        if self.mgmt_port == 0 {
            self.mgmt_port = DEFAULT_MGMT_PORT;
        }
        if self.ready_poll_interval.is_zero() {
            self.ready_poll_interval = DEFAULT_POLL_INTERVAL;
        }
        self
    }

    pub fn disk_path(&self) -> PathBuf {
        self.work_dir.join(&self.disk_image)
    }

    pub fn efi_code_path(&self) -> PathBuf {
        self.work_dir.join(&self.efi_code)
    }

    pub fn efi_vars_path(&self) -> PathBuf {
        self.work_dir.join(&self.efi_vars)
    }

    /// Image files that must exist before the device can be constructed
    pub fn required_images(&self) -> [PathBuf; 3] {
        [self.disk_path(), self.efi_code_path(), self.efi_vars_path()]
    }

    /// Per-instance directory for sockets, logs and the pid file
    pub fn run_dir(&self) -> PathBuf {
        self.work_dir.join("run").join(&self.name)
    }

    /// Serial console log file
    pub fn serial_log_path(&self) -> PathBuf {
        self.run_dir().join("serial.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_get_defaults() {
        let config = DeviceConfig {
            memory_mib: 0,
            cpus: 0,
            ssh_port: 0,
            mgmt_port: 0,
            ready_poll_interval: Duration::ZERO,
            ..DeviceConfig::default()
        }
        .with_defaults();

        assert_eq!(config.memory_mib, 4096);
        assert_eq!(config.cpus, 4);
        assert_eq!(config.ssh_port, 2222);
        assert_eq!(config.mgmt_port, 8080);
        assert_eq!(config.ready_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_explicit_values_are_kept() {
        let config = DeviceConfig {
            memory_mib: 2048,
            cpus: 2,
            ssh_port: 3022,
            mgmt_port: 9090,
            ..DeviceConfig::default()
        }
        .with_defaults();

        assert_eq!(config.memory_mib, 2048);
        assert_eq!(config.cpus, 2);
        assert_eq!(config.ssh_port, 3022);
        assert_eq!(config.mgmt_port, 9090);
    }

    #[test]
    fn test_paths_are_under_work_dir() {
        let config = DeviceConfig {
            name: "leaf1".to_string(),
            work_dir: PathBuf::from("/images"),
            ..DeviceConfig::default()
        };
        assert_eq!(config.disk_path(), PathBuf::from("/images/device.qcow2"));
        assert_eq!(config.run_dir(), PathBuf::from("/images/run/leaf1"));
        assert_eq!(
            config.serial_log_path(),
            PathBuf::from("/images/run/leaf1/serial.log")
        );
    }
}
