//! Node-pool-version command

use clap::Args;

use keel_eks::node_pool_version;

use crate::Result;

#[derive(Args, Debug)]
pub struct NodePoolVersionArgs {
    /// Machine image of the pool
    #[arg(long)]
    pub image: String,

    /// Root volume size in GiB
    #[arg(long)]
    pub volume_size: u32,
}

pub async fn run(args: NodePoolVersionArgs) -> Result<()> {
    println!("{}", node_pool_version(&args.image, args.volume_size));
    Ok(())
}
