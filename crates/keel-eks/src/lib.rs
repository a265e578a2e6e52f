//! Managed Kubernetes control plane for EKS-style clusters
//!
//! Pure planning and validation (node pool diffs, subnet resolution, network
//! and encryption rules, addon version selection, launch fingerprints) plus
//! the durable pipelines that roll a cluster's control plane version and its
//! node pool stacks forward.
//!
//! Cloud access goes through the traits in [`cloud`]; pipelines run on
//! [`keel_workflow`] so a restarted run resumes instead of starting over.

#![deny(missing_docs)]

pub mod activities;
pub mod addon;
pub mod cidr;
pub mod cloud;
pub mod config;
pub mod encryption;
pub mod image;
pub mod node_pool;
pub mod plan;
pub mod polling;
pub mod subnet;
pub mod workflows;

#[cfg(test)]
mod testing;

pub use activities::Context;
pub use addon::{select_latest_version, AddonVersion};
pub use cidr::Ipv4Cidr;
pub use config::OrchestratorConfig;
pub use encryption::{validate_encryption_config, EncryptionConfig};
pub use image::{ImageSelector, StaticImageSelector};
pub use node_pool::{diff_node_pools, node_pool_version, NodePoolDiff};
pub use plan::{plan_cluster_update, ClusterRef, ClusterUpdatePlan};
pub use subnet::{resolve_subnet, validate_cluster_network};
pub use workflows::{update_cluster_version, update_node_pool};
