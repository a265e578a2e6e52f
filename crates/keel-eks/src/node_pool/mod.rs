//! Node pool planning: diffing, version fingerprints and volume sizing

mod diff;
mod version;
mod volume;

pub use diff::{diff_node_pools, NodePoolDiff};
pub use version::node_pool_version;
pub use volume::select_volume_size;

/// Name of the infrastructure stack backing a node pool
pub fn stack_name(cluster_name: &str, node_pool: &str) -> String {
    format!("keel-eks-nodepool-{cluster_name}-{node_pool}")
}
