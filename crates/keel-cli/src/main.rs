//! Keel CLI
//!
//! Operator tooling for node pool planning and request validation.

use clap::Parser;

use keel_cli::{Cli, Result};
use keel_common::telemetry::{init_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig {
        service_name: "keel-cli".to_string(),
        format: cli.log_format.into(),
        ..Default::default()
    })?;

    cli.run().await
}
