//! Device instance lifecycle
//!
//! A [`DeviceInstance`] owns at most one hypervisor process. State moves
//! `Unstarted -> Starting -> Ready -> Stopping -> Stopped`; a crash moves a
//! live instance straight to `Stopped` from the monitor task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use vdut_core::config::{ConnectionParams, DeviceConfig};
use vdut_core::{DeviceError, DeviceState, RemoteChannel, RemoteError};

use crate::monitor::{Monitor, ProcessExit};
use crate::qemu;
use crate::readiness;

/// One emulated network device and its hypervisor process
pub struct DeviceInstance {
    config: DeviceConfig,
    /// Credentials used for the forwarded SSH endpoint
    connection: ConnectionParams,
    state: Arc<watch::Sender<DeviceState>>,
    process: Option<Monitor>,
    last_exit: Option<ProcessExit>,
}

impl DeviceInstance {
    /// Create an instance after checking that every required image exists
    ///
    /// No process is spawned here.
    pub fn new(config: DeviceConfig, connection: ConnectionParams) -> Result<Self, DeviceError> {
        let config = config.with_defaults();
        for path in config.required_images() {
            if !path.is_file() {
                return Err(DeviceError::MissingImage { path });
            }
        }

        let (state, _) = watch::channel(DeviceState::Unstarted);
        Ok(Self {
            config,
            connection,
            state: Arc::new(state),
            process: None,
            last_exit: None,
        })
    }

    /// Launch the hypervisor and hand it to a monitor task
    ///
    /// Returns once the process is spawned; use [`wait_ready`](Self::wait_ready)
    /// to wait for the guest to boot.
    pub async fn start(&mut self) -> Result<(), DeviceError> {
        if self.process.is_some() {
            return Err(DeviceError::AlreadyRunning(self.config.name.clone()));
        }

        let child = qemu::spawn(&self.config).await?;
        self.state.send_replace(DeviceState::Starting);
        let monitor = Monitor::spawn(self.config.name.clone(), child, Arc::clone(&self.state));

        tracing::info!(
            "Started device '{}' (pid {:?}, ssh {}, mgmt {})",
            self.config.name,
            monitor.pid,
            self.ssh_address(),
            self.management_address()
        );
        tracing::info!("Serial console log: {}", self.serial_log_path().display());

        self.last_exit = None;
        self.process = Some(monitor);
        Ok(())
    }

    /// Poll `probe` until the guest answers or `timeout` elapses
    ///
    /// A timeout leaves the process running.
    pub async fn wait_ready(
        &mut self,
        probe: &dyn RemoteChannel,
        timeout: Duration,
    ) -> Result<(), DeviceError> {
        if self.process.is_none() {
            return Err(DeviceError::NotRunning(self.config.name.clone()));
        }

        tracing::info!(
            "Waiting up to {:?} for device '{}' on {}",
            timeout,
            self.config.name,
            probe.target()
        );
        match readiness::wait_until_ready(
            &self.config.name,
            probe,
            &self.state,
            timeout,
            self.config.ready_poll_interval,
        )
        .await
        {
            Ok(_) => {
                self.state.send_if_modified(|state| {
                    if *state == DeviceState::Starting {
                        *state = DeviceState::Ready;
                        true
                    } else {
                        false
                    }
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    "Device '{}' did not become ready: {} (serial log: {})",
                    self.config.name,
                    e,
                    self.serial_log_path().display()
                );
                Err(e)
            }
        }
    }

    /// Stop the hypervisor, interrupting it first and killing it after `grace`
    ///
    /// A no-op when nothing is running.
    pub async fn stop(&mut self, grace: Duration) -> Result<(), DeviceError> {
        let Some(mut monitor) = self.process.take() else {
            tracing::debug!("Device '{}' not running, nothing to stop", self.config.name);
            return Ok(());
        };

        let was_live = self.state.send_if_modified(|state| {
            if state.is_live() {
                *state = DeviceState::Stopping;
                true
            } else {
                false
            }
        });
        monitor.cancel.cancel();

        // The monitor sends the interrupt while it still owns the child, so
        // an already reaped pid is never signalled.
        if was_live && !monitor.handle.is_finished() {
            monitor.interrupt.cancel();
        } else {
            tracing::debug!(
                "Device '{}' already exited, skipping interrupt",
                self.config.name
            );
        }

        let joined = match tokio::time::timeout(grace, &mut monitor.handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    "Device '{}' still running after {:?}, killing",
                    self.config.name,
                    grace
                );
                monitor.kill.cancel();
                (&mut monitor.handle).await
            }
        };

        let exit = joined
            .map_err(|e| DeviceError::Reap(e.to_string()))?
            .map_err(DeviceError::Reap)?;

        self.state.send_replace(DeviceState::Stopped);
        self.last_exit = Some(exit);
        tracing::info!("Device '{}' stopped", self.config.name);
        Ok(())
    }

    /// Run the readiness probe once
    pub async fn check_ssh(&self, probe: &dyn RemoteChannel) -> Result<(), RemoteError> {
        readiness::probe(probe).await
    }

    /// Host address forwarded to the guest SSH port
    pub fn ssh_address(&self) -> String {
        format!("127.0.0.1:{}", self.config.ssh_port)
    }

    /// Host address forwarded to the guest management port
    pub fn management_address(&self) -> String {
        format!("127.0.0.1:{}", self.config.mgmt_port)
    }

    pub fn serial_log_path(&self) -> PathBuf {
        self.config.serial_log_path()
    }

    /// Connection parameters pointed at the forwarded SSH port
    pub fn connection_params(&self) -> ConnectionParams {
        self.connection.forwarded(self.config.ssh_port)
    }

    pub fn state(&self) -> DeviceState {
        *self.state.borrow()
    }

    /// Watch state changes, including crashes seen by the monitor
    pub fn subscribe(&self) -> watch::Receiver<DeviceState> {
        self.state.subscribe()
    }

    /// Exit recorded by the last [`stop`](Self::stop)
    pub fn last_exit(&self) -> Option<ProcessExit> {
        self.last_exit
    }

    /// Whether a process handle is held and the process is alive
    pub fn is_running(&self) -> bool {
        self.process.is_some() && self.state().is_live()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|m| m.pid)
    }
}

impl Drop for DeviceInstance {
    fn drop(&mut self) {
        if let Some(monitor) = self.process.take() {
            tracing::warn!(
                "Device '{}' dropped while running, killing",
                self.config.name
            );
            monitor.cancel.cancel();
            monitor.kill.cancel();
        }
    }
}
