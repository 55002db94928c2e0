//! Orchestrated test run
//!
//! Rebuild (optional), boot, prepare, clean-slate install, run the test
//! body, then uninstall and stop. The test body's exit code becomes the
//! command's exit code.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{bail, Context, Result};

use super::testbed::Testbed;
use crate::output::{print_error, print_info, print_success, print_warning};
use crate::signal::shutdown_signal;
use vdut_agent::AgentManager;
use vdut_core::config::{BuildConfig, TestbedConfig};

/// Flags for `vdut run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub rebuild: bool,
    pub keep_on_failure: bool,
    pub binary: Option<PathBuf>,
    pub command: Vec<String>,
}

/// Execute a full run and return the test body's exit code
pub async fn run_command(config: &TestbedConfig, options: RunOptions) -> Result<i32> {
    if options.command.is_empty() {
        bail!("No test command given (usage: vdut run -- <command> [args...])");
    }
    let keep_on_failure = options.keep_on_failure || config.keep_on_failure;

    if options.rebuild {
        let build = config
            .agent
            .build
            .as_ref()
            .context("--rebuild needs an [agent.build] section in the config")?;
        rebuild(build).await?;
    }

    let binary = options
        .binary
        .clone()
        .unwrap_or_else(|| config.agent.binary.clone());
    if !binary.is_file() {
        bail!(vdut_core::AgentError::BinaryNotFound(binary));
    }

    let testbed = Testbed::boot(config).await?;
    let manager = AgentManager::from_config(testbed.channel.clone(), config);

    print_info("Preparing device environment");
    if let Err(e) = manager.prepare_environment().await {
        let error = anyhow::Error::new(e).context("Environment preparation failed");
        return Err(testbed.abort(error).await);
    }

    if let Err(e) = manager.uninstall().await {
        print_warning(&format!("Pre-install cleanup failed: {}", e));
    }

    print_info(&format!("Installing agent from {}", binary.display()));
    match manager.install(&binary).await {
        Ok(state) => print_success(&format!("Agent '{}' {}", manager.layout().name, state)),
        Err(e) => {
            let error = anyhow::Error::new(e).context("Agent install failed");
            return Err(testbed.abort(error).await);
        }
    }

    let code = run_test_body(&testbed, config, &options.command).await;
    if code == 0 {
        print_success("Test command passed");
    } else {
        print_error(&format!("Test command failed with exit code {}", code));
    }

    let mut testbed = testbed;
    if code != 0 && keep_on_failure {
        print_warning("Keeping device for inspection; press Ctrl+C to tear down");
        print_info(&format!("  ssh:    {}", testbed.device.ssh_address()));
        print_info(&format!("  mgmt:   {}", testbed.device.management_address()));
        print_info(&format!(
            "  serial: {}",
            testbed.device.serial_log_path().display()
        ));
        shutdown_signal().await;
    }

    match tokio::time::timeout(testbed.teardown_timeout(), manager.uninstall()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => print_warning(&format!("Agent uninstall failed: {}", e)),
        Err(_) => print_warning("Agent uninstall timed out"),
    }
    testbed.shutdown().await;

    Ok(code)
}

/// Run the configured build command on the host
async fn rebuild(build: &BuildConfig) -> Result<()> {
    print_info(&format!("Rebuilding agent: {}", build.command));
    let mut command = tokio::process::Command::new("sh");
    command.arg("-c").arg(&build.command);
    if let Some(dir) = &build.dir {
        command.current_dir(dir);
    }

    let status = command
        .status()
        .await
        .with_context(|| format!("Failed to run build command: {}", build.command))?;
    if !status.success() {
        bail!("Build command failed with {}", status);
    }
    print_success("Agent rebuilt");
    Ok(())
}

/// Run the test body with the device endpoints in its environment
async fn run_test_body(testbed: &Testbed, config: &TestbedConfig, command: &[String]) -> i32 {
    let Some((program, args)) = command.split_first() else {
        return 1;
    };
    let params = testbed.device.connection_params();

    print_info(&format!("Running test command: {}", command.join(" ")));
    let status = tokio::process::Command::new(program)
        .args(args)
        .env("VDUT_SSH_ADDR", testbed.device.ssh_address())
        .env("VDUT_MGMT_ADDR", testbed.device.management_address())
        .env("VDUT_SSH_USER", &params.username)
        .env("VDUT_SSH_KEY", &params.private_key_path)
        .env("VDUT_SERIAL_LOG", testbed.device.serial_log_path())
        .env("VDUT_AGENT_BINARY", config.agent.layout.binary_path())
        .stdin(Stdio::inherit())
        .status()
        .await;

    match status {
        Ok(status) => exit_code(&status),
        Err(e) => {
            print_error(&format!("Failed to run {}: {}", program, e));
            127
        }
    }
}

/// Exit code of a finished test body; signal deaths map to 128 + signal
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let err = run_command(&TestbedConfig::default(), RunOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No test command"));
    }

    #[tokio::test]
    async fn test_rebuild_without_build_section() {
        let options = RunOptions {
            rebuild: true,
            command: vec!["true".to_string()],
            ..RunOptions::default()
        };
        let err = run_command(&TestbedConfig::default(), options)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("[agent.build]"));
    }

    #[tokio::test]
    async fn test_failed_rebuild_stops_before_boot() {
        let build = BuildConfig {
            command: "exit 4".to_string(),
            dir: None,
        };
        let err = rebuild(&build).await.unwrap_err();
        assert!(err.to_string().contains("Build command failed"));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_from_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code(&std::process::ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(&std::process::ExitStatus::from_raw(9)), 137);
    }
}
