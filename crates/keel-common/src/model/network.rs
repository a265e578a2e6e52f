//! Network types: subnets, VPC and the cluster network request

use serde::{Deserialize, Serialize};

/// A cluster subnet
///
/// Either pre-existing (has `subnet_id`) or to be created at cluster creation
/// time (has `cidr` and `availability_zone`). Subnets known for a running
/// cluster carry all three fields.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Provider subnet ID (e.g., "subnet-0a1b2c")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,

    /// IPv4 CIDR block (e.g., "192.168.64.0/18")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    /// Availability zone (e.g., "us-west-2a")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

impl Subnet {
    /// Reference an existing subnet by ID
    pub fn existing(subnet_id: impl Into<String>) -> Self {
        Self {
            subnet_id: Some(subnet_id.into()),
            ..Default::default()
        }
    }

    /// Describe a subnet to be created
    pub fn new_in_zone(cidr: impl Into<String>, availability_zone: impl Into<String>) -> Self {
        Self {
            subnet_id: None,
            cidr: Some(cidr.into()),
            availability_zone: Some(availability_zone.into()),
        }
    }

    /// Set the CIDR of a known subnet
    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = Some(cidr.into());
        self
    }

    /// Set the availability zone of a known subnet
    pub fn with_zone(mut self, availability_zone: impl Into<String>) -> Self {
        self.availability_zone = Some(availability_zone.into());
        self
    }

    /// Non-empty subnet ID
    pub fn id(&self) -> Option<&str> {
        self.subnet_id.as_deref().filter(|s| !s.is_empty())
    }

    /// Non-empty CIDR
    pub fn cidr(&self) -> Option<&str> {
        self.cidr.as_deref().filter(|s| !s.is_empty())
    }

    /// Non-empty availability zone
    pub fn zone(&self) -> Option<&str> {
        self.availability_zone.as_deref().filter(|s| !s.is_empty())
    }

    /// Referenced by ID
    pub fn is_existing(&self) -> bool {
        self.id().is_some()
    }

    /// To be created from a CIDR
    pub fn is_new(&self) -> bool {
        self.id().is_none() && self.cidr().is_some()
    }
}

/// VPC selection for cluster creation: reuse an existing VPC or create one
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    /// Existing VPC ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    /// CIDR for a VPC to be created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
}

/// Network part of a cluster creation request
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    /// VPC to use or create
    #[serde(default)]
    pub vpc: Vpc,

    /// Cluster subnets, all existing or all new
    #[serde(default)]
    pub subnets: Vec<Subnet>,

    /// Route table for new subnets in an existing VPC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,
}
