//! Bring up a standalone device for manual work

use anyhow::Result;

use super::testbed::Testbed;
use crate::output::{print_error, print_info, print_success};
use crate::signal::shutdown_signal;
use vdut_agent::AgentManager;
use vdut_core::config::TestbedConfig;

/// Boot and prepare a device, hold it until Ctrl+C, then stop it
pub async fn up_command(config: &TestbedConfig) -> Result<()> {
    let mut testbed = Testbed::boot(config).await?;

    let manager = AgentManager::from_config(testbed.channel.clone(), config);
    if let Err(e) = manager.prepare_environment().await {
        let error = anyhow::Error::new(e).context("Environment preparation failed");
        return Err(testbed.abort(error).await);
    }
    print_success("Environment prepared");

    let params = testbed.device.connection_params();
    print_info(&format!(
        "ssh -i {} -p {} {}@{}",
        params.private_key_path.display(),
        params.port,
        params.username,
        params.host
    ));
    print_info(&format!(
        "Management endpoint: {}",
        testbed.device.management_address()
    ));
    print_info(&format!(
        "Serial console log: {}",
        testbed.device.serial_log_path().display()
    ));
    print_info("Press Ctrl+C to stop the device");

    let mut state = testbed.device.subscribe();
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = state.wait_for(|s| !s.is_live()) => {
            print_error("Device exited unexpectedly");
        }
    }

    testbed.shutdown().await;
    Ok(())
}
