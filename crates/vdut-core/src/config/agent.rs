//! Agent deployment configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the agent under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Local path of the prebuilt agent binary
    pub binary: PathBuf,

    /// How to rebuild the binary before a run
    pub build: Option<BuildConfig>,

    /// Remote filesystem and service layout
    pub layout: AgentLayout,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("target/x86_64-unknown-linux-musl/release/netagent"),
            build: None,
            layout: AgentLayout::default(),
        }
    }
}

/// Build step run on the host before any VM work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Shell command producing the agent binary
    pub command: String,

    /// Working directory for the command
    pub dir: Option<PathBuf>,
}

/// Where the agent lives on the device
///
/// All paths are remote POSIX paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLayout {
    /// Agent name; used for the binary, unit and rc-script pattern
    pub name: String,

    /// Unit description line
    pub description: String,

    /// Installation prefix (`<install_dir>/bin/<name>`)
    pub install_dir: String,

    /// Configuration directory
    pub config_dir: String,

    /// systemd unit directory
    pub unit_dir: String,

    /// Log file cleared before each install
    pub log_file: String,

    /// Staging directory for uploads
    pub upload_dir: String,

    /// Extra arguments for `ExecStart`
    pub args: Vec<String>,
}

impl Default for AgentLayout {
    fn default() -> Self {
        Self {
            name: "netagent".to_string(),
            description: "Network device agent".to_string(),
            install_dir: "/opt/netagent".to_string(),
            config_dir: "/etc/netagent".to_string(),
            unit_dir: "/etc/systemd/system".to_string(),
            log_file: "/var/log/netagent.log".to_string(),
            upload_dir: "/tmp".to_string(),
            args: vec![],
        }
    }
}

impl AgentLayout {
    pub fn binary_path(&self) -> String {
        format!("{}/bin/{}", self.install_dir, self.name)
    }

    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }

    pub fn unit_path(&self) -> String {
        format!("{}/{}", self.unit_dir, self.unit_name())
    }

    /// Temporary remote path the binary is uploaded to before the move
    pub fn upload_path(&self) -> String {
        format!("{}/{}.upload", self.upload_dir, self.name)
    }

    /// Shell glob matching legacy SysV startup links
    pub fn legacy_script_glob(&self) -> String {
        format!("/etc/rc*.d/*{}*", self.name)
    }

    /// `ExecStart` command line
    pub fn exec_start(&self) -> String {
        let mut line = self.binary_path();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}
