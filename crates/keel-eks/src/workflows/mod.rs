//! Durable update pipelines
//!
//! Each pipeline is an async function over a [`keel_workflow::WorkflowContext`]
//! and the activity [`Context`](crate::activities::Context). Every side effect
//! goes through an activity, so re-running a pipeline with the same run id
//! replays the finished steps and continues where it stopped.

mod addons;
mod cluster_version;
mod node_pool_update;

pub use addons::update_addons;
pub use cluster_version::{update_cluster_version, ClusterVersionUpdateState};
pub use node_pool_update::{update_node_pool, NodePoolUpdateOutcome, NodePoolUpdateState};
