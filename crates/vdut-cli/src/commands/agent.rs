//! Standalone agent commands against an already-running device

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::output::{format_agent_status, print_info, print_success};
use vdut_agent::AgentManager;
use vdut_core::config::TestbedConfig;
use vdut_core::{AgentState, RemoteChannel};
use vdut_remote::SshChannel;

/// `status --json` document
#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    agent: &'a str,
    target: String,
    #[serde(flatten)]
    state: &'a AgentState,
}

/// Manager talking to the device named by `[connection]`
fn connect(config: &TestbedConfig) -> Result<(Arc<dyn RemoteChannel>, AgentManager)> {
    let channel: Arc<dyn RemoteChannel> = Arc::new(
        SshChannel::new(config.connection.clone())
            .context("Failed to set up the SSH channel")?,
    );
    let manager = AgentManager::from_config(Arc::clone(&channel), config);
    Ok((channel, manager))
}

/// Install the agent binary
pub async fn install_command(config: &TestbedConfig, binary: Option<PathBuf>) -> Result<()> {
    let binary = binary.unwrap_or_else(|| config.agent.binary.clone());
    let (channel, manager) = connect(config)?;

    print_info(&format!(
        "Installing {} on {}",
        binary.display(),
        channel.target()
    ));
    let state = manager
        .install(&binary)
        .await
        .context("Agent install failed")?;
    print_success(&format!("Agent '{}' {}", manager.layout().name, state));
    Ok(())
}

/// Remove the agent
pub async fn uninstall_command(config: &TestbedConfig) -> Result<()> {
    let (channel, manager) = connect(config)?;
    manager
        .uninstall()
        .await
        .context("Agent uninstall failed")?;
    print_success(&format!(
        "Agent '{}' not installed on {}",
        manager.layout().name,
        channel.target()
    ));
    Ok(())
}

/// Show the derived agent state
pub async fn status_command(config: &TestbedConfig, json: bool) -> Result<()> {
    let (channel, manager) = connect(config)?;
    let state = manager.status().await.context("Failed to probe agent")?;

    if json {
        let report = StatusReport {
            agent: &manager.layout().name,
            target: channel.target(),
            state: &state,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}",
            format_agent_status(&manager.layout().name, &channel.target(), &state)
        );
    }
    Ok(())
}

/// Run the one-time environment preparation
pub async fn prepare_command(config: &TestbedConfig) -> Result<()> {
    let (channel, manager) = connect(config)?;
    manager
        .prepare_environment()
        .await
        .context("Environment preparation failed")?;
    print_success(&format!("Environment prepared on {}", channel.target()));
    Ok(())
}
