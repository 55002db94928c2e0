//! Declarative remote step lists
//!
//! Every lifecycle operation is an ordered list of [`Step`]s. The runner
//! stops at the first failing [`Severity::Fatal`] step and logs and skips
//! failing [`Severity::BestEffort`] steps.

use std::fmt;
use std::path::PathBuf;

use vdut_core::{AgentError, RemoteChannel, RemoteError};

/// What happens when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the operation
    Fatal,
    /// Log a warning and continue
    BestEffort,
}

/// Remote action performed by a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run a shell command
    Exec(String),
    /// Copy a local file to a remote path
    Transfer { local: PathBuf, remote: String },
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Exec(command) => write!(f, "{}", command),
            Action::Transfer { local, remote } => {
                write!(f, "transfer {} -> {}", local.display(), remote)
            }
        }
    }
}

/// One named step of a lifecycle operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: &'static str,
    pub severity: Severity,
    pub action: Action,
}

impl Step {
    pub fn fatal(name: &'static str, command: impl Into<String>) -> Self {
        Self {
            name,
            severity: Severity::Fatal,
            action: Action::Exec(command.into()),
        }
    }

    pub fn best_effort(name: &'static str, command: impl Into<String>) -> Self {
        Self {
            name,
            severity: Severity::BestEffort,
            action: Action::Exec(command.into()),
        }
    }

    /// Fatal file transfer
    pub fn transfer(name: &'static str, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            name,
            severity: Severity::Fatal,
            action: Action::Transfer {
                local: local.into(),
                remote: remote.into(),
            },
        }
    }

    async fn execute(&self, channel: &dyn RemoteChannel) -> Result<(), RemoteError> {
        match &self.action {
            Action::Exec(command) => channel.exec(command).await.map(|_| ()),
            Action::Transfer { local, remote } => {
                let bytes = channel.transfer(local, remote).await?;
                tracing::debug!("Transferred {} bytes to {}", bytes, remote);
                Ok(())
            }
        }
    }
}

/// Outcome of a completed step list
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Steps that succeeded
    pub completed: usize,
    /// Names of best-effort steps that failed
    pub skipped: Vec<&'static str>,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} steps", self.completed)?;
        if !self.skipped.is_empty() {
            write!(f, ", skipped: {}", self.skipped.join(", "))?;
        }
        Ok(())
    }
}

/// Run `steps` in order against `channel`
///
/// `operation` names the lifecycle operation in log lines.
pub async fn run_steps(
    channel: &dyn RemoteChannel,
    operation: &str,
    steps: &[Step],
) -> Result<StepReport, AgentError> {
    let target = channel.target();
    let mut report = StepReport::default();

    for step in steps {
        tracing::debug!("[{}] {}: {} ({})", target, operation, step.name, step.action);
        match step.execute(channel).await {
            Ok(()) => report.completed += 1,
            Err(e) => match step.severity {
                Severity::Fatal => {
                    tracing::error!(
                        "[{}] {}: step '{}' failed: {}{}",
                        target,
                        operation,
                        step.name,
                        e,
                        output_suffix(&e)
                    );
                    return Err(AgentError::Step {
                        step: step.name.to_string(),
                        source: e,
                    });
                }
                Severity::BestEffort => {
                    tracing::warn!(
                        "[{}] {}: ignoring failed step '{}': {}{}",
                        target,
                        operation,
                        step.name,
                        e,
                        output_suffix(&e)
                    );
                    report.skipped.push(step.name);
                }
            },
        }
    }

    Ok(report)
}

fn output_suffix(error: &RemoteError) -> String {
    match error.output().map(str::trim) {
        Some(output) if !output.is_empty() => format!(" ({})", output),
        _ => String::new(),
    }
}
