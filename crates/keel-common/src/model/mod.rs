//! Data model shared by the planners and the update pipelines

mod cluster;
mod network;
mod node_pool;
mod request;

pub use cluster::{messages, ClusterStatus};
pub use network::{ClusterNetwork, Subnet, Vpc};
pub use node_pool::{NodePool, NodePoolModel, NodePoolSpec, NodePoolStatus, ON_DEMAND_SPOT_PRICE};
pub use request::{
    ClusterUpdateRequest, ClusterVersionUpdateRequest, NodePoolUpdateRequest, UpdateOptions,
};
