//! One-time device environment preparation

use vdut_core::AgentError;

use crate::manager::AgentManager;
use crate::steps::{run_steps, Step};
use crate::units;

impl AgentManager {
    /// Patch the DHCP client unit and make sure the observability binary is present
    ///
    /// Safe to repeat: the unit is rewritten with identical content and the
    /// binary is only fetched and transferred when the device lacks the
    /// configured version.
    pub async fn prepare_environment(&self) -> Result<(), AgentError> {
        let env = &self.environment;
        tracing::info!("[{}] Preparing environment", self.channel.target());

        let dhcp = [
            Step::fatal(
                "write dhcp unit",
                units::write_file_command(&env.dhcp_unit_path(), &units::dhcp_oneshot_unit(env)),
            ),
            Step::fatal("daemon-reload", "sudo systemctl daemon-reload"),
            Step::best_effort(
                "restart dhcp",
                format!("sudo systemctl restart {}", env.dhcp_unit),
            ),
        ];
        let report = run_steps(self.channel.as_ref(), "prepare", &dhcp).await?;
        tracing::info!(
            "[{}] DHCP unit {} written ({})",
            self.channel.target(),
            env.dhcp_unit,
            report
        );

        if env.alloy.enabled {
            self.ensure_alloy().await?;
        } else {
            tracing::debug!("Alloy provisioning disabled");
        }
        Ok(())
    }

    async fn ensure_alloy(&self) -> Result<(), AgentError> {
        let alloy = &self.environment.alloy;
        let version_cmd = format!("{} --version", alloy.remote_path);

        match self.channel.exec(&version_cmd).await {
            Ok(output) if reported_version(&output) == Some(alloy.bare_version()) => {
                tracing::info!(
                    "[{}] Alloy {} already installed",
                    self.channel.target(),
                    alloy.version
                );
                return Ok(());
            }
            Ok(output) => tracing::info!(
                "[{}] Replacing Alloy ({})",
                self.channel.target(),
                output.lines().next().unwrap_or_default().trim()
            ),
            Err(e) => tracing::debug!("No usable Alloy on device: {}", e),
        }

        let local = self.cache.get_or_fetch(&alloy.version).await?;
        let upload = format!("{}/alloy.upload", self.layout.upload_dir);
        let install_dir = alloy
            .remote_path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .filter(|dir| !dir.is_empty())
            .unwrap_or("/");

        let steps = [
            Step::transfer("upload alloy", local, upload.clone()),
            Step::fatal("create alloy dir", format!("sudo mkdir -p {}", install_dir)),
            Step::fatal(
                "place alloy",
                format!(
                    "sudo mv {} {} && sudo chmod 755 {}",
                    upload, alloy.remote_path, alloy.remote_path
                ),
            ),
            Step::best_effort("verify alloy", version_cmd),
        ];
        let report = run_steps(self.channel.as_ref(), "prepare", &steps).await?;

        tracing::info!(
            "[{}] Alloy {} installed at {} ({})",
            self.channel.target(),
            alloy.version,
            alloy.remote_path,
            report
        );
        Ok(())
    }
}

/// Version number from `--version` output such as `alloy, version v1.5.1 (branch: HEAD)`
///
/// Takes the word after `version`, or failing that the first word that
/// looks like a version. A leading `v` and trailing punctuation are dropped.
fn reported_version(output: &str) -> Option<&str> {
    let first_line = output.lines().next()?;
    let words: Vec<&str> = first_line.split_whitespace().collect();
    let candidate = words
        .iter()
        .position(|w| w.trim_end_matches(',').eq_ignore_ascii_case("version"))
        .and_then(|i| words.get(i + 1).copied())
        .or_else(|| {
            words.iter().copied().find(|w| {
                w.trim_start_matches('v')
                    .starts_with(|c: char| c.is_ascii_digit())
            })
        })?;

    let version = candidate
        .trim_start_matches('v')
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric());
    (!version.is_empty()).then_some(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_version_after_keyword() {
        assert_eq!(
            reported_version("alloy, version v1.5.1 (branch: HEAD, revision: 3a2f1)\n  build user: root\n"),
            Some("1.5.1")
        );
        assert_eq!(reported_version("alloy, version 1.5.10\n"), Some("1.5.10"));
    }

    #[test]
    fn test_reported_version_without_keyword() {
        assert_eq!(reported_version("alloy v11.5.1"), Some("11.5.1"));
        assert_eq!(reported_version("sh: alloy: not found"), None);
        assert_eq!(reported_version(""), None);
    }

    #[test]
    fn test_prefix_versions_are_distinct() {
        for output in ["alloy, version v1.5.10", "alloy, version v11.5.1", "alloy, version v1.5.1-rc.1"] {
            assert_ne!(reported_version(output), Some("1.5.1"), "{}", output);
        }
    }
}
