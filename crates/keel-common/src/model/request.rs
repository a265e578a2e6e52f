//! Operation requests accepted from the API layer
//!
//! Plain value objects: they carry no behavior and are serialized into the
//! step log as workflow inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::network::{Subnet, Vpc};
use super::node_pool::NodePoolSpec;

/// Request to move a cluster's control plane to a new Kubernetes version
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterVersionUpdateRequest {
    /// Provider region
    pub region: String,
    /// Reference to the provider credentials secret
    pub provider_secret_ref: String,
    /// Platform cluster ID
    pub cluster_id: u64,
    /// Provider cluster name
    pub cluster_name: String,
    /// Target Kubernetes version (e.g., "1.29")
    pub target_version: String,
}

/// Rolling update settings for a node pool stack
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    /// Maximum number of nodes replaced at once (0 = provider default)
    #[serde(default)]
    pub max_batch_size: u32,
    /// Extra nodes allowed above the desired count during the update
    #[serde(default)]
    pub max_surge: u32,
}

/// Request to update one node pool's infrastructure stack
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolUpdateRequest {
    /// Reference to the provider credentials secret
    pub provider_secret_ref: String,
    /// Provider region
    pub region: String,
    /// Name of the node pool's infrastructure stack
    pub stack_name: String,
    /// Owning organization
    pub organization_id: u64,
    /// Platform cluster ID
    pub cluster_id: u64,
    /// Reference to the cluster's own secret (kubeconfig)
    pub cluster_secret_ref: String,
    /// Provider cluster name
    pub cluster_name: String,
    /// Node pool name
    pub node_pool_name: String,
    /// New root volume size; kept or selected when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_volume_size: Option<u32>,
    /// New machine image; read from the stack when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<String>,
    /// Rolling update settings
    #[serde(default)]
    pub update_options: UpdateOptions,
    /// Tags applied to the stack
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cluster_tags: BTreeMap<String, String>,
}

/// Request to reconcile a cluster's node pools against a desired state
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUpdateRequest {
    /// Owning organization
    pub organization_id: u64,
    /// Provider region
    pub region: String,
    /// Reference to the provider credentials secret
    pub secret_ref: String,
    /// Desired node pools by name
    #[serde(default)]
    pub node_pools: BTreeMap<String, NodePoolSpec>,
    /// Subnets referenced by the request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<Subnet>,
    /// VPC of the cluster
    #[serde(default)]
    pub vpc: Vpc,
    /// Tags applied to new and updated stacks
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}
