//! Validate-network command

use std::path::PathBuf;

use clap::Args;

use keel_common::model::ClusterNetwork;
use keel_eks::validate_cluster_network;

use super::read_input;
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateNetworkArgs {
    /// File holding the cluster's VPC, subnets and route table
    pub file: PathBuf,

    /// Cluster name used in error messages
    #[arg(long, default_value = "cluster")]
    pub cluster: String,
}

pub async fn run(args: ValidateNetworkArgs) -> Result<()> {
    let network: ClusterNetwork = read_input(&args.file)?;
    validate_cluster_network(&args.cluster, &network)?;
    println!("network for {} is valid", args.cluster);
    Ok(())
}
