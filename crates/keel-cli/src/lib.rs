//! Keel CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use keel_common::telemetry::LogFormat;

/// Keel - node pool planning and validation for managed clusters
#[derive(Parser, Debug)]
#[command(name = "keel")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Orchestrator configuration file (YAML)
    #[arg(long, global = true, env = "KEEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, env = "KEEL_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

/// Log formats selectable on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Json,
    Text,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Text => LogFormat::Text,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan the node pool work for a cluster update
    Plan(commands::plan::PlanArgs),
    /// Validate the network section of a cluster creation request
    ValidateNetwork(commands::validate_network::ValidateNetworkArgs),
    /// Validate a cluster's encryption configuration
    ValidateEncryption(commands::validate_encryption::ValidateEncryptionArgs),
    /// Compute the launch fingerprint of a node pool
    NodePoolVersion(commands::node_pool_version::NodePoolVersionArgs),
    /// Pick the newest addon version compatible with a cluster version
    SelectAddon(commands::select_addon::SelectAddonArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let config = commands::load_config(self.config.as_deref())?;
        match self.command {
            Commands::Plan(args) => commands::plan::run(args, &config).await,
            Commands::ValidateNetwork(args) => commands::validate_network::run(args).await,
            Commands::ValidateEncryption(args) => commands::validate_encryption::run(args).await,
            Commands::NodePoolVersion(args) => commands::node_pool_version::run(args).await,
            Commands::SelectAddon(args) => commands::select_addon::run(args).await,
        }
    }
}
