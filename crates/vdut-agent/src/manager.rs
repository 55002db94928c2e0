//! Agent install, status and uninstall
//!
//! Probes are read-only and their negative answers (non-zero exit) are not
//! errors. Mutating operations are step lists run through
//! [`run_steps`](crate::steps::run_steps) and re-probed afterwards.

use std::path::Path;
use std::sync::Arc;

use vdut_core::config::{AgentLayout, EnvironmentConfig, TestbedConfig};
use vdut_core::{AgentError, AgentState, RemoteChannel, RemoteError};

use crate::cache::{ArtifactCache, DirCache};
use crate::fetch::HttpFetcher;
use crate::steps::{run_steps, Step};
use crate::units;

/// Lifecycle manager for one agent on one device
pub struct AgentManager {
    pub(crate) channel: Arc<dyn RemoteChannel>,
    pub(crate) layout: AgentLayout,
    pub(crate) environment: EnvironmentConfig,
    pub(crate) cache: Arc<dyn ArtifactCache>,
}

impl AgentManager {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        layout: AgentLayout,
        environment: EnvironmentConfig,
        cache: Arc<dyn ArtifactCache>,
    ) -> Self {
        Self {
            channel,
            layout,
            environment,
            cache,
        }
    }

    /// Manager using the HTTP-backed directory cache from `config`
    pub fn from_config(channel: Arc<dyn RemoteChannel>, config: &TestbedConfig) -> Self {
        let alloy = &config.environment.alloy;
        let cache = DirCache::new(
            alloy.cache_dir.join("alloy"),
            "alloy",
            HttpFetcher::for_alloy(alloy),
        );
        Self::new(
            channel,
            config.agent.layout.clone(),
            config.environment.clone(),
            Arc::new(cache),
        )
    }

    pub fn layout(&self) -> &AgentLayout {
        &self.layout
    }

    /// Whether the agent binary is present on the device
    pub async fn is_installed(&self) -> Result<bool, AgentError> {
        self.probe("installed", &format!("test -f {}", self.layout.binary_path()))
            .await
    }

    /// Whether the service manager reports the unit active
    pub async fn is_running(&self) -> Result<bool, AgentError> {
        self.probe(
            "running",
            &format!("sudo systemctl is-active {}", self.layout.unit_name()),
        )
        .await
    }

    /// Whether the unit is enabled at boot
    pub async fn is_enabled(&self) -> Result<bool, AgentError> {
        self.probe(
            "enabled",
            &format!("sudo systemctl is-enabled {}", self.layout.unit_name()),
        )
        .await
    }

    /// Current state derived from fresh probes
    pub async fn status(&self) -> Result<AgentState, AgentError> {
        if !self.is_installed().await? {
            return Ok(AgentState::NotInstalled);
        }
        if !self.is_running().await? {
            return Ok(AgentState::InstalledStopped);
        }
        Ok(AgentState::InstalledRunning {
            process: self.process_line().await,
        })
    }

    /// Remove the agent, its unit and its directories
    ///
    /// Succeeds without touching the device when nothing is installed.
    pub async fn uninstall(&self) -> Result<(), AgentError> {
        if !self.is_installed().await? {
            tracing::info!(
                "[{}] Agent '{}' not installed, nothing to remove",
                self.channel.target(),
                self.layout.name
            );
            return Ok(());
        }

        tracing::info!(
            "[{}] Uninstalling agent '{}'",
            self.channel.target(),
            self.layout.name
        );
        let report = run_steps(self.channel.as_ref(), "uninstall", &self.uninstall_steps()).await?;

        if self.is_installed().await? {
            return Err(AgentError::Verification(format!(
                "{} still present after uninstall",
                self.layout.binary_path()
            )));
        }
        tracing::info!(
            "[{}] Agent '{}' removed ({})",
            self.channel.target(),
            self.layout.name,
            report
        );
        Ok(())
    }

    /// Install `local_binary` as a fresh, enabled and started service
    ///
    /// An existing installation is fully removed first. A missing local
    /// binary fails before the device is contacted.
    pub async fn install(&self, local_binary: &Path) -> Result<AgentState, AgentError> {
        match tokio::fs::metadata(local_binary).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(AgentError::BinaryNotFound(local_binary.to_path_buf())),
        }

        if self.is_installed().await? {
            tracing::info!(
                "[{}] Agent '{}' already installed, reinstalling",
                self.channel.target(),
                self.layout.name
            );
            self.uninstall().await?;
        }

        tracing::info!(
            "[{}] Installing {} as {}",
            self.channel.target(),
            local_binary.display(),
            self.layout.binary_path()
        );
        let report = run_steps(
            self.channel.as_ref(),
            "install",
            &self.install_steps(local_binary),
        )
        .await?;

        if !self.is_installed().await? {
            return Err(AgentError::Verification(format!(
                "{} missing after install",
                self.layout.binary_path()
            )));
        }
        if !self.is_enabled().await? {
            return Err(AgentError::Verification(format!(
                "{} not enabled after install",
                self.layout.unit_name()
            )));
        }

        let state = if self.is_running().await? {
            AgentState::InstalledRunning {
                process: self.process_line().await,
            }
        } else {
            tracing::info!(
                "[{}] {} installed but not active yet",
                self.channel.target(),
                self.layout.unit_name()
            );
            AgentState::InstalledStopped
        };
        tracing::info!(
            "[{}] Agent '{}' {} ({})",
            self.channel.target(),
            self.layout.name,
            state,
            report
        );
        Ok(state)
    }

    fn uninstall_steps(&self) -> Vec<Step> {
        let layout = &self.layout;
        let unit = layout.unit_name();
        vec![
            Step::best_effort("stop", format!("sudo systemctl stop {}", unit)),
            Step::best_effort("disable", format!("sudo systemctl disable {}", unit)),
            Step::fatal("remove unit", format!("sudo rm -f {}", layout.unit_path())),
            Step::best_effort("daemon-reload", "sudo systemctl daemon-reload"),
            Step::fatal(
                "remove install dir",
                format!("sudo rm -rf {}", layout.install_dir),
            ),
            Step::fatal(
                "remove config dir",
                format!("sudo rm -rf {}", layout.config_dir),
            ),
            Step::best_effort(
                "remove legacy scripts",
                format!("sudo sh -c 'rm -f {}'", layout.legacy_script_glob()),
            ),
        ]
    }

    fn install_steps(&self, local_binary: &Path) -> Vec<Step> {
        let layout = &self.layout;
        let unit = layout.unit_name();
        let binary = layout.binary_path();
        let upload = layout.upload_path();
        vec![
            Step::fatal(
                "create dirs",
                format!(
                    "sudo mkdir -p {}/bin {}",
                    layout.install_dir, layout.config_dir
                ),
            ),
            Step::best_effort("clear log", format!("sudo rm -f {}", layout.log_file)),
            Step::transfer("upload", local_binary, upload.clone()),
            Step::fatal(
                "place binary",
                format!(
                    "sudo mv {} {} && sudo chmod 755 {}",
                    upload, binary, binary
                ),
            ),
            Step::fatal(
                "write unit",
                units::write_file_command(&layout.unit_path(), &units::agent_unit(layout)),
            ),
            Step::fatal("daemon-reload", "sudo systemctl daemon-reload"),
            Step::fatal("enable", format!("sudo systemctl enable {}", unit)),
            Step::fatal("start", format!("sudo systemctl start {}", unit)),
        ]
    }

    /// Run a yes/no probe; a non-zero exit means "no"
    async fn probe(&self, name: &str, command: &str) -> Result<bool, AgentError> {
        match self.channel.exec(command).await {
            Ok(_) => Ok(true),
            Err(RemoteError::ExitStatus { status, .. }) => {
                tracing::trace!("Probe '{}' answered no (status {})", name, status);
                Ok(false)
            }
            Err(source) => Err(AgentError::Probe {
                probe: name.to_string(),
                source,
            }),
        }
    }

    /// First matching process line, if the process table can be read
    async fn process_line(&self) -> Option<String> {
        let command = format!("pgrep -a -f {}", self.layout.binary_path());
        match self.channel.exec(&command).await {
            Ok(output) => output
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string),
            Err(e) => {
                tracing::debug!("No process line for '{}': {}", self.layout.name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct Unreachable;

    #[async_trait]
    impl RemoteChannel for Unreachable {
        async fn exec(&self, _command: &str) -> Result<String, RemoteError> {
            Err(RemoteError::Connect {
                address: "127.0.0.1:2222".to_string(),
                reason: "Connection refused".to_string(),
            })
        }

        async fn transfer(&self, _: &Path, _: &str) -> Result<u64, RemoteError> {
            unreachable!()
        }

        fn target(&self) -> String {
            "unreachable".to_string()
        }
    }

    struct NoCache;

    #[async_trait]
    impl ArtifactCache for NoCache {
        async fn get_or_fetch(&self, _key: &str) -> Result<PathBuf, AgentError> {
            unreachable!()
        }
    }

    fn manager() -> AgentManager {
        AgentManager::new(
            Arc::new(Unreachable),
            AgentLayout::default(),
            EnvironmentConfig::default(),
            Arc::new(NoCache),
        )
    }

    #[tokio::test]
    async fn test_transport_failure_is_a_probe_error() {
        let err = manager().is_installed().await.unwrap_err();
        assert!(matches!(err, AgentError::Probe { ref probe, .. } if probe == "installed"));
    }

    #[test]
    fn test_uninstall_severities() {
        let steps = manager().uninstall_steps();
        let fatal: Vec<_> = steps
            .iter()
            .filter(|s| s.severity == crate::Severity::Fatal)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            fatal,
            vec!["remove unit", "remove install dir", "remove config dir"]
        );
    }

    #[test]
    fn test_install_moves_and_chmods_in_one_command() {
        let steps = manager().install_steps(Path::new("/build/netagent"));
        let place = steps.iter().find(|s| s.name == "place binary").unwrap();
        assert_eq!(
            place.action,
            crate::Action::Exec(
                "sudo mv /tmp/netagent.upload /opt/netagent/bin/netagent && sudo chmod 755 /opt/netagent/bin/netagent"
                    .to_string()
            )
        );
        let names: Vec<_> = steps.iter().map(|s| s.name).collect();
        assert_eq!(
            &names[names.len() - 3..],
            &["daemon-reload", "enable", "start"]
        );
    }
}
