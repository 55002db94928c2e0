//! CLI command implementations

mod agent;
mod config;
mod run;
mod testbed;
mod up;

pub use agent::{install_command, prepare_command, status_command, uninstall_command};
pub use config::{config_init, config_path, config_show, load_testbed};
pub use run::{run_command, RunOptions};
pub use testbed::Testbed;
pub use up::up_command;
