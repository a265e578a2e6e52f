//! Node pool types: the requested spec and the persisted model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::network::Subnet;

/// Spot price sentinel meaning "launch on-demand instances"
pub const ON_DEMAND_SPOT_PRICE: &str = "0";

/// Requested configuration for one node pool
///
/// Instance type, image and volume size become stack parameters and are
/// immutable after that except through a node pool update. Size bounds and
/// labels can change in place.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    /// Machine instance type (e.g., "m5.large")
    #[serde(default)]
    pub instance_type: String,

    /// Machine image ID
    #[serde(default)]
    pub image: String,

    /// Root volume size in GiB; selected from the image size when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<u32>,

    /// Maximum spot bid; empty means on-demand
    #[serde(default)]
    pub spot_price: String,

    /// Whether the cluster autoscaler manages this pool
    #[serde(default)]
    pub autoscaling: bool,

    /// Minimum node count
    #[serde(default)]
    pub min_count: u32,

    /// Maximum node count
    #[serde(default)]
    pub max_count: u32,

    /// Desired node count
    #[serde(default)]
    pub count: u32,

    /// Extra security groups attached to the nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,

    /// Subnet to launch into; the first cluster subnet when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<Subnet>,

    /// Kubernetes node labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl NodePoolSpec {
    /// Whether this pool launches spot instances
    pub fn is_spot(&self) -> bool {
        !self.spot_price.is_empty() && self.spot_price != ON_DEMAND_SPOT_PRICE
    }
}

/// A requested node pool together with its name
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    /// Unique name within the cluster
    pub name: String,
    /// Requested configuration
    #[serde(flatten)]
    pub spec: NodePoolSpec,
}

/// Node pool lifecycle status
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodePoolStatus {
    /// Stack is being created
    #[default]
    Creating,
    /// Stack is up to date
    Ready,
    /// Stack update in progress
    Updating,
    /// Stack is being deleted
    Deleting,
    /// Last operation failed
    Error,
}

impl std::fmt::Display for NodePoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Ready => write!(f, "ready"),
            Self::Updating => write!(f, "updating"),
            Self::Deleting => write!(f, "deleting"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Persisted node pool row
///
/// Created on first provisioning, mutated on every reconciliation pass and
/// removed once deletion completes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolModel {
    /// Unique name within the cluster
    pub name: String,
    /// Identity of the user that created the pool
    #[serde(default)]
    pub created_by: u64,
    /// Current instance type
    #[serde(default)]
    pub instance_type: String,
    /// Current machine image
    #[serde(default)]
    pub image: String,
    /// Current root volume size in GiB
    #[serde(default)]
    pub volume_size: u32,
    /// Current node labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Backing infrastructure stack identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: NodePoolStatus,
    /// Human readable detail for the status
    #[serde(default)]
    pub status_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_detection() {
        let mut spec = NodePoolSpec::default();
        assert!(!spec.is_spot());
        spec.spot_price = ON_DEMAND_SPOT_PRICE.to_string();
        assert!(!spec.is_spot());
        spec.spot_price = "0.04".to_string();
        assert!(spec.is_spot());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&NodePoolStatus::Updating).unwrap();
        assert_eq!(json, "\"updating\"");
        assert_eq!(NodePoolStatus::Error.to_string(), "error");
    }

    #[test]
    fn spec_parses_from_yaml() {
        let yaml = r#"
instanceType: m5.large
image: ami-0123
spotPrice: ""
autoscaling: true
minCount: 1
maxCount: 3
count: 2
subnet:
  subnetId: subnet-1
labels:
  team: data
"#;
        let spec: NodePoolSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.instance_type, "m5.large");
        assert_eq!(spec.max_count, 3);
        assert_eq!(
            spec.subnet.and_then(|s| s.subnet_id).as_deref(),
            Some("subnet-1")
        );
        assert_eq!(spec.labels.get("team").map(String::as_str), Some("data"));
    }
}
