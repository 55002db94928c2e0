//! Readiness polling over the remote shell

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use vdut_core::{DeviceError, DeviceState, RemoteChannel, RemoteError};

/// Trivial command whose success means the remote shell is up
pub(crate) const READY_PROBE: &str = "echo ready";

/// Run the readiness probe once
pub(crate) async fn probe(channel: &dyn RemoteChannel) -> Result<(), RemoteError> {
    channel.exec(READY_PROBE).await.map(|_| ())
}

/// Poll `channel` every `interval` until the probe succeeds or `timeout` elapses
///
/// Returns the number of attempts made. Gives up early if the watched
/// process leaves the live states.
pub(crate) async fn wait_until_ready(
    name: &str,
    channel: &dyn RemoteChannel,
    state: &watch::Sender<DeviceState>,
    timeout: Duration,
    interval: Duration,
) -> Result<u32, DeviceError> {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        if !state.borrow().is_live() {
            return Err(DeviceError::NotRunning(name.to_string()));
        }

        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, probe(channel)).await {
            Ok(Ok(())) => {
                tracing::info!(
                    "Device '{}' answered on {} after {} attempt(s)",
                    name,
                    channel.target(),
                    attempts
                );
                return Ok(attempts);
            }
            Ok(Err(e)) => {
                tracing::debug!("Device '{}' not ready (attempt {}): {}", name, attempts, e);
            }
            Err(_) => {
                tracing::debug!("Device '{}' probe timed out (attempt {})", name, attempts);
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DeviceError::ReadinessTimeout { timeout, attempts });
        }
        if attempts % 6 == 0 {
            tracing::info!(
                "Still waiting for device '{}' ({} attempts, {:?} left)",
                name,
                attempts,
                deadline - now
            );
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Probe target that fails a fixed number of times before answering
    struct FlakyShell {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyShell {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteChannel for FlakyShell {
        async fn exec(&self, command: &str) -> Result<String, RemoteError> {
            assert_eq!(command, READY_PROBE);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(RemoteError::Connect {
                    address: "127.0.0.1:2222".to_string(),
                    reason: "Connection refused".to_string(),
                })
            } else {
                Ok("ready\n".to_string())
            }
        }

        async fn transfer(&self, _: &Path, _: &str) -> Result<u64, RemoteError> {
            unreachable!("readiness never transfers files")
        }

        fn target(&self) -> String {
            "admin@127.0.0.1:2222".to_string()
        }
    }

    fn live_state() -> watch::Sender<DeviceState> {
        watch::channel(DeviceState::Starting).0
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_attempt() {
        let shell = FlakyShell::new(0);
        let attempts = wait_until_ready(
            "leaf1",
            &shell,
            &live_state(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_retries() {
        let shell = FlakyShell::new(3);
        let started = Instant::now();
        let attempts = wait_until_ready(
            "leaf1",
            &shell,
            &live_state(),
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(attempts, 4);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_attempts() {
        let shell = FlakyShell::new(u32::MAX);
        let err = wait_until_ready(
            "leaf1",
            &shell,
            &live_state(),
            Duration::from_secs(12),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        match err {
            DeviceError::ReadinessTimeout { timeout, attempts } => {
                assert_eq!(timeout, Duration::from_secs(12));
                // t=0, t=5, t=10, t=12
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_shorter_than_interval() {
        let shell = FlakyShell::new(u32::MAX);
        let started = Instant::now();
        let err = wait_until_ready(
            "leaf1",
            &shell,
            &live_state(),
            Duration::from_millis(100),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeviceError::ReadinessTimeout { .. }));
        assert!(started.elapsed() <= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_process_aborts_wait() {
        let shell = FlakyShell::new(u32::MAX);
        let (state, _) = watch::channel(DeviceState::Stopped);
        let err = wait_until_ready(
            "leaf1",
            &shell,
            &state,
            Duration::from_secs(60),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DeviceError::NotRunning(_)));
        assert_eq!(shell.calls.load(Ordering::SeqCst), 0);
    }
}
