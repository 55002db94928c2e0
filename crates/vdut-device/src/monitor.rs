//! Background task watching the hypervisor process

use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vdut_core::DeviceState;

/// How the hypervisor process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Whether the exit was requested through [`crate::DeviceInstance::stop`]
    pub expected: bool,
}

/// Handle to a running process and its monitor task
pub(crate) struct Monitor {
    pub(crate) pid: Option<u32>,
    /// Cancelled before a requested shutdown; marks the exit as expected
    pub(crate) cancel: CancellationToken,
    /// Cancelled to make the monitor send SIGINT to the child it still owns
    pub(crate) interrupt: CancellationToken,
    /// Cancelled to make the monitor force-kill the child
    pub(crate) kill: CancellationToken,
    pub(crate) handle: JoinHandle<Result<ProcessExit, String>>,
}

impl Monitor {
    /// Take ownership of `child` and watch it until it exits
    pub(crate) fn spawn(
        name: String,
        mut child: Child,
        state: Arc<watch::Sender<DeviceState>>,
    ) -> Self {
        let pid = child.id();
        let cancel = CancellationToken::new();
        let interrupt = CancellationToken::new();
        let kill = CancellationToken::new();

        let task_cancel = cancel.clone();
        let task_interrupt = interrupt.clone();
        let task_kill = kill.clone();
        let handle = tokio::spawn(async move {
            let mut interrupted = false;
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    _ = task_interrupt.cancelled(), if !interrupted => {
                        interrupted = true;
                        // id() is None once the child has been reaped.
                        if let Some(pid) = child.id() {
                            tracing::info!("Interrupting device '{}' (pid {})", name, pid);
                            if let Err(e) = send_interrupt(pid) {
                                tracing::warn!(
                                    "Failed to interrupt device '{}' (pid {}): {}",
                                    name,
                                    pid,
                                    e
                                );
                            }
                        }
                    }
                    _ = task_kill.cancelled() => {
                        tracing::warn!("Force-killing device '{}' (pid {:?})", name, pid);
                        if let Err(e) = child.start_kill() {
                            tracing::warn!("Kill of device '{}' failed: {}", name, e);
                        }
                        break child.wait().await;
                    }
                }
            };

            let expected = task_cancel.is_cancelled();
            state.send_replace(DeviceState::Stopped);

            let status = status.map_err(|e| {
                tracing::error!("Failed to wait for device '{}': {}", name, e);
                e.to_string()
            })?;

            if expected {
                tracing::info!("Device '{}' exited ({})", name, status);
            } else {
                tracing::error!("Device '{}' exited unexpectedly ({})", name, status);
            }

            Ok(ProcessExit {
                code: status.code(),
                expected,
            })
        });

        Self {
            pid,
            cancel,
            interrupt,
            kill,
            handle,
        }
    }
}

/// Send SIGINT to `pid`
#[cfg(unix)]
fn send_interrupt(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_interrupt(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "graceful interrupt is only supported on unix",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn shell(script: &str) -> Child {
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .kill_on_drop(true)
            .spawn()
            .unwrap()
    }

    fn state() -> Arc<watch::Sender<DeviceState>> {
        Arc::new(watch::channel(DeviceState::Starting).0)
    }

    #[tokio::test]
    async fn test_interrupt_after_exit_is_ignored() {
        let state = state();
        let mut rx = state.subscribe();
        let monitor = Monitor::spawn("leaf1".to_string(), shell("exit 3"), Arc::clone(&state));

        rx.wait_for(|s| *s == DeviceState::Stopped).await.unwrap();
        monitor.interrupt.cancel();

        let exit = monitor.handle.await.unwrap().unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(!exit.expected);
    }

    #[tokio::test]
    async fn test_interrupt_reaches_live_child() {
        let state = state();
        let monitor = Monitor::spawn("leaf1".to_string(), shell("exec sleep 30"), state);

        monitor.cancel.cancel();
        monitor.interrupt.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(5), monitor.handle)
            .await
            .expect("child ignored SIGINT")
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, None);
        assert!(exit.expected);
    }

    #[tokio::test]
    async fn test_kill_ends_child_that_ignores_interrupt() {
        let state = state();
        let monitor = Monitor::spawn(
            "leaf1".to_string(),
            shell("trap '' INT; while true; do sleep 1; done"),
            Arc::clone(&state),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        monitor.cancel.cancel();
        monitor.interrupt.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!monitor.handle.is_finished());

        monitor.kill.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(5), monitor.handle)
            .await
            .expect("kill did not end the child")
            .unwrap()
            .unwrap();
        assert_eq!(exit.code, None);
        assert_eq!(*state.borrow(), DeviceState::Stopped);
    }
}
