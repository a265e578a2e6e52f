//! Validate-encryption command

use std::path::PathBuf;

use clap::Args;

use keel_eks::{validate_encryption_config, EncryptionConfig};

use super::read_input;
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateEncryptionArgs {
    /// File holding a list of encryption config entries
    pub file: PathBuf,

    /// Region the cluster runs in
    #[arg(long)]
    pub region: String,

    /// Cluster name used in error messages
    #[arg(long, default_value = "cluster")]
    pub cluster: String,
}

pub async fn run(args: ValidateEncryptionArgs) -> Result<()> {
    let configs: Vec<EncryptionConfig> = read_input(&args.file)?;
    validate_encryption_config(&args.cluster, &args.region, &configs)?;
    println!("encryption config for {} is valid", args.cluster);
    Ok(())
}
