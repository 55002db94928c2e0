//! vdut CLI
//!
//! Single binary for disposable device test runs:
//! - `run`: boot a device, install the agent, run a test command, tear down
//! - `up`: boot and prepare a device for manual work
//! - agent management against an already-running device
//! - configuration helpers

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vdut_cli::commands::{self, RunOptions};

#[derive(Parser)]
#[command(name = "vdut")]
#[command(author, version, about = "Virtual device under test harness")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "VDUT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a device, install the agent, run a test command and tear down
    ///
    /// The exit code of the test command is passed through.
    Run {
        /// Run the configured build command first
        #[arg(long)]
        rebuild: bool,
        /// Keep the device running after a failed test until Ctrl+C
        #[arg(long)]
        keep_on_failure: bool,
        /// Agent binary to install (overrides config)
        #[arg(short, long)]
        binary: Option<PathBuf>,
        /// Test command and its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Boot and prepare a device, then hold it until Ctrl+C
    Up,

    /// Install the agent on a running device
    Install {
        /// Agent binary to install (overrides config)
        #[arg(short, long)]
        binary: Option<PathBuf>,
    },

    /// Remove the agent from a running device
    Uninstall,

    /// Show the agent state on a running device
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Patch the DHCP unit and provision Alloy on a running device
    Prepare,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Run {
            rebuild,
            keep_on_failure,
            binary,
            command,
        } => {
            let config = commands::load_testbed(config_path)?;
            let options = RunOptions {
                rebuild,
                keep_on_failure,
                binary,
                command,
            };
            let code = commands::run_command(&config, options).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Up => {
            let config = commands::load_testbed(config_path)?;
            commands::up_command(&config).await?;
        }

        Commands::Install { binary } => {
            let config = commands::load_testbed(config_path)?;
            commands::install_command(&config, binary).await?;
        }

        Commands::Uninstall => {
            let config = commands::load_testbed(config_path)?;
            commands::uninstall_command(&config).await?;
        }

        Commands::Status { json } => {
            let config = commands::load_testbed(config_path)?;
            commands::status_command(&config, json).await?;
        }

        Commands::Prepare => {
            let config = commands::load_testbed(config_path)?;
            commands::prepare_command(&config).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Path => commands::config_path(config_path),
            ConfigAction::Init { force } => commands::config_init(config_path, force)?,
        },
    }

    Ok(())
}
