//! Cloud provider and persistence collaborators
//!
//! The pipelines talk to the managed cluster API, the infrastructure stack
//! API, the machine image API and the platform's status store only through
//! these traits. SDK-backed implementations live outside this crate; tests
//! use the generated mocks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use keel_common::model::{ClusterStatus, NodePoolStatus};
use keel_common::{Error, Result};

use crate::addon::AddonVersion;

/// Provider error code returned for a request that changes nothing
pub const NO_UPDATE_CODE: &str = "ValidationError";
/// Message fragment identifying the "nothing to update" stack response
pub const NO_UPDATE_MESSAGE: &str = "No updates are to be performed";

/// Region and credentials every provider call is made with
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudTarget {
    /// Provider region
    pub region: String,
    /// Reference to the provider credentials secret
    pub secret_ref: String,
}

impl CloudTarget {
    /// Target a region with the given credentials
    pub fn new(region: impl Into<String>, secret_ref: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            secret_ref: secret_ref.into(),
        }
    }
}

/// Progress of a provider-side cluster or addon update
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Still running
    InProgress,
    /// Finished successfully
    Successful,
    /// Finished unsuccessfully
    Failed,
    /// Cancelled by the provider
    Cancelled,
}

/// Result of describing an update
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescription {
    /// Update identifier
    pub id: String,
    /// Current status
    pub status: UpdateStatus,
    /// Error details reported for a failed update
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Current state of an infrastructure stack
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackDescription {
    /// Provider status (e.g., "UPDATE_IN_PROGRESS")
    pub status: String,
    /// Reason reported with the status
    #[serde(default)]
    pub reason: String,
}

/// One stack parameter
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackParameter {
    /// Parameter key (e.g., "NodeImageId")
    pub key: String,
    /// Parameter value
    pub value: String,
}

impl StackParameter {
    /// Build a parameter
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A node pool stack update
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackUpdate {
    /// Stack to update
    pub stack_name: String,
    /// Parameters to set; parameters not listed keep their previous value
    pub parameters: Vec<StackParameter>,
    /// Tags applied to the stack
    pub tags: BTreeMap<String, String>,
}

/// Managed cluster API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Start a control plane version update, returning the update ID
    async fn update_cluster_version(
        &self,
        target: &CloudTarget,
        cluster_name: &str,
        version: &str,
        idempotency_token: &str,
    ) -> Result<String>;

    /// Describe a cluster update, or an addon update when `addon` is set
    async fn describe_update(
        &self,
        target: &CloudTarget,
        cluster_name: &str,
        update_id: &str,
        addon: Option<String>,
    ) -> Result<UpdateDescription>;

    /// Installed version of an addon, `None` when the addon is not installed
    async fn describe_addon(
        &self,
        target: &CloudTarget,
        cluster_name: &str,
        addon: &str,
    ) -> Result<Option<String>>;

    /// Published versions of an addon
    async fn list_addon_versions(
        &self,
        target: &CloudTarget,
        addon: &str,
    ) -> Result<Vec<AddonVersion>>;

    /// Start an addon update, returning the update ID
    async fn update_addon(
        &self,
        target: &CloudTarget,
        cluster_name: &str,
        addon: &str,
        version: &str,
        idempotency_token: &str,
    ) -> Result<String>;
}

/// Infrastructure stack API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Current status of a stack
    async fn describe_stack(
        &self,
        target: &CloudTarget,
        stack_name: &str,
    ) -> Result<StackDescription>;

    /// Current parameters of a stack
    async fn stack_parameters(
        &self,
        target: &CloudTarget,
        stack_name: &str,
    ) -> Result<Vec<StackParameter>>;

    /// Submit a stack update
    ///
    /// A request that changes nothing fails with a provider error carrying
    /// [`NO_UPDATE_CODE`] and [`NO_UPDATE_MESSAGE`]; see [`is_no_update`].
    async fn update_stack(
        &self,
        target: &CloudTarget,
        update: &StackUpdate,
        idempotency_token: &str,
    ) -> Result<()>;
}

/// Machine image API
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageApi: Send + Sync {
    /// Root device size of an image, in GiB
    async fn root_volume_size(&self, target: &CloudTarget, image_id: &str) -> Result<u32>;
}

/// Platform persistence for cluster and node pool rows
///
/// Writes are unconditional: the last writer wins.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Overwrite a cluster's status and status message
    async fn set_cluster_status(
        &self,
        cluster_id: u64,
        status: ClusterStatus,
        message: &str,
    ) -> Result<()>;

    /// Record a cluster's Kubernetes version
    async fn set_cluster_version(&self, cluster_id: u64, version: &str) -> Result<()>;

    /// Overwrite a node pool's status and status message
    async fn set_node_pool_status(
        &self,
        cluster_id: u64,
        node_pool: &str,
        status: NodePoolStatus,
        message: &str,
    ) -> Result<()>;
}

/// Whether a stack update failure means there was nothing to change
pub fn is_no_update(error: &Error) -> bool {
    match error {
        Error::Provider { code, message, .. } => {
            code.as_deref() == Some(NO_UPDATE_CODE) && message.contains(NO_UPDATE_MESSAGE)
        }
        _ => false,
    }
}
