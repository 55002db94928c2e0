//! Device bring-up and teardown shared by `run` and `up`

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::output::{format_duration, print_error, print_info, print_success, print_warning};
use vdut_core::config::TestbedConfig;
use vdut_core::RemoteChannel;
use vdut_device::DeviceInstance;
use vdut_remote::SshChannel;

/// A started device and the channel that reaches it
pub struct Testbed {
    pub device: DeviceInstance,
    pub channel: Arc<dyn RemoteChannel>,
    teardown_timeout: Duration,
}

impl Testbed {
    /// Start the device and wait until it answers over SSH
    ///
    /// The device is stopped again if it never becomes ready.
    pub async fn boot(config: &TestbedConfig) -> Result<Self> {
        let mut device = DeviceInstance::new(config.device.clone(), config.connection.clone())
            .context("Failed to set up device")?;
        let channel: Arc<dyn RemoteChannel> = Arc::new(
            SshChannel::new(device.connection_params())
                .context("Failed to set up the SSH channel")?,
        );

        print_info(&format!("Starting device '{}'", device.name()));
        device.start().await.context("Failed to start device")?;

        let mut testbed = Self {
            device,
            channel,
            teardown_timeout: config.teardown_timeout,
        };

        let started = Instant::now();
        print_info(&format!(
            "Waiting up to {} for {}",
            format_duration(config.ready_timeout),
            testbed.channel.target()
        ));
        let ready = testbed
            .device
            .wait_ready(testbed.channel.as_ref(), config.ready_timeout)
            .await;
        if let Err(e) = ready {
            print_error(&format!("Device never became ready: {}", e));
            print_error(&format!(
                "Serial console log: {}",
                testbed.device.serial_log_path().display()
            ));
            testbed.shutdown().await;
            return Err(e).context("Device boot failed");
        }

        print_success(&format!(
            "Device '{}' ready after {} (ssh {}, mgmt {})",
            testbed.device.name(),
            format_duration(started.elapsed()),
            testbed.device.ssh_address(),
            testbed.device.management_address()
        ));
        Ok(testbed)
    }

    /// Stop the device within the teardown timeout; failures are reported, not returned
    pub async fn shutdown(&mut self) {
        match self.device.stop(self.teardown_timeout).await {
            Ok(()) => print_success(&format!("Device '{}' stopped", self.device.name())),
            Err(e) => print_warning(&format!(
                "Failed to stop device '{}': {}",
                self.device.name(),
                e
            )),
        }
    }

    /// Stop the device and hand back `error` for the caller to return
    pub async fn abort(mut self, error: anyhow::Error) -> anyhow::Error {
        print_error(&format!("{:#}", error));
        self.shutdown().await;
        error
    }

    pub fn teardown_timeout(&self) -> Duration {
        self.teardown_timeout
    }
}
