//! Select-addon command

use std::path::PathBuf;

use clap::Args;

use keel_eks::{select_latest_version, AddonVersion};

use super::read_input;
use crate::Result;

#[derive(Args, Debug)]
pub struct SelectAddonArgs {
    /// File listing the available addon versions
    pub versions: PathBuf,

    /// Currently installed addon version
    #[arg(long)]
    pub current: String,

    /// Kubernetes version the addon must support
    #[arg(long)]
    pub cluster_version: String,
}

pub async fn run(args: SelectAddonArgs) -> Result<()> {
    let available: Vec<AddonVersion> = read_input(&args.versions)?;
    let selected = select_latest_version(&available, &args.current, &args.cluster_version)?;
    println!("{selected}");
    Ok(())
}
