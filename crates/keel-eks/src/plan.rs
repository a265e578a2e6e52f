//! Cluster update planning
//!
//! Turns a desired node pool set into the work an update pass performs: pools
//! to create (with their resolved subnets), one [`NodePoolUpdateRequest`] per
//! existing pool, pools to delete and the status rows to write up front. All
//! validation happens here, before any cloud call, and every problem is
//! reported at once.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keel_common::model::{
    ClusterUpdateRequest, NodePoolModel, NodePoolSpec, NodePoolStatus, NodePoolUpdateRequest,
    UpdateOptions,
};
use keel_common::{Error, Result};

use crate::image::ImageSelector;
use crate::node_pool::{diff_node_pools, stack_name};
use crate::subnet::resolve_subnet;

/// The cluster a plan is computed for
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    /// Platform cluster ID
    pub cluster_id: u64,
    /// Provider cluster name
    pub cluster_name: String,
    /// Current Kubernetes version
    pub kubernetes_version: String,
    /// Reference to the cluster's own secret
    #[serde(default)]
    pub cluster_secret_ref: String,
}

/// A node pool to provision
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannedNodePool {
    /// Pool name
    pub name: String,
    /// Stack that will back the pool
    pub stack_name: String,
    /// Pool spec, with defaults applied
    pub spec: NodePoolSpec,
    /// Subnets the pool launches into
    pub subnet_ids: Vec<String>,
}

/// A node pool status row to write before the work starts
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatusRow {
    /// Pool name
    pub name: String,
    /// Status to set
    pub status: NodePoolStatus,
}

/// Work for one cluster update pass
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterUpdatePlan {
    /// Pools to provision
    pub created: Vec<PlannedNodePool>,
    /// Stack updates for existing pools
    pub updates: Vec<NodePoolUpdateRequest>,
    /// Pools to remove
    pub deleted: Vec<String>,
    /// Status rows for every affected pool
    pub statuses: Vec<NodePoolStatusRow>,
}

impl ClusterUpdatePlan {
    /// Whether the pass has nothing to do
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updates.is_empty() && self.deleted.is_empty()
    }
}

/// Plan the node pool work needed to bring `cluster` to `request`
///
/// New pools without an image get the default for the cluster's Kubernetes
/// version when an `images` selector is given.
pub fn plan_cluster_update(
    cluster: &ClusterRef,
    current: &[NodePoolModel],
    request: &ClusterUpdateRequest,
    images: Option<&dyn ImageSelector>,
) -> Result<ClusterUpdatePlan> {
    let mut errors = Vec::new();

    let mut requested = request.node_pools.clone();
    if let Some(images) = images {
        default_images(cluster, current, &request.region, &mut requested, images, &mut errors);
    }

    for (name, spec) in &requested {
        if let Err(e) = validate_pool_size(name, spec) {
            errors.push(e);
        }
    }

    // The differ reports missing fields itself; its errors join the rest
    let diff = match diff_node_pools(current, &requested) {
        Ok(diff) => diff,
        Err(e) => {
            errors.push(e);
            return Error::combine(errors).map(|()| ClusterUpdatePlan::default());
        }
    };

    let mut plan = ClusterUpdatePlan::default();
    for pool in diff.created {
        match resolve_subnet(&pool.name, &pool.spec, &request.subnets) {
            Ok(subnet_ids) => {
                plan.statuses.push(NodePoolStatusRow {
                    name: pool.name.clone(),
                    status: NodePoolStatus::Creating,
                });
                plan.created.push(PlannedNodePool {
                    stack_name: stack_name(&cluster.cluster_name, &pool.name),
                    name: pool.name,
                    spec: pool.spec,
                    subnet_ids,
                });
            }
            Err(e) => errors.push(e),
        }
    }
    Error::combine(errors)?;

    for pool in diff.updated {
        plan.statuses.push(NodePoolStatusRow {
            name: pool.name.clone(),
            status: NodePoolStatus::Updating,
        });
        plan.updates.push(update_request(cluster, request, &pool.name, &pool.spec));
    }
    for pool in diff.deleted {
        plan.statuses.push(NodePoolStatusRow {
            name: pool.name.clone(),
            status: NodePoolStatus::Deleting,
        });
        plan.deleted.push(pool.name);
    }

    info!(
        cluster = %cluster.cluster_name,
        created = plan.created.len(),
        updated = plan.updates.len(),
        deleted = plan.deleted.len(),
        "planned cluster update"
    );
    Ok(plan)
}

fn default_images(
    cluster: &ClusterRef,
    current: &[NodePoolModel],
    region: &str,
    requested: &mut BTreeMap<String, NodePoolSpec>,
    images: &dyn ImageSelector,
    errors: &mut Vec<Error>,
) {
    for (name, spec) in requested.iter_mut() {
        let is_new = !current.iter().any(|p| &p.name == name);
        if !is_new || !spec.image.is_empty() || spec.instance_type.is_empty() {
            continue;
        }
        match images.select_image(&cluster.kubernetes_version, region, &spec.instance_type) {
            Ok(image) => {
                debug!(node_pool = %name, image = %image, "defaulted node pool image");
                spec.image = image;
            }
            Err(e) => errors.push(e),
        }
    }
}

/// Check the pool's node counts
///
/// `min_count <= max_count` always holds; autoscaling pools must also start
/// inside their bounds.
fn validate_pool_size(name: &str, spec: &NodePoolSpec) -> Result<()> {
    if spec.min_count > spec.max_count {
        return Err(Error::validation_for_field(
            name,
            "minCount",
            format!(
                "node pool {name} minimum count {} exceeds maximum count {}",
                spec.min_count, spec.max_count
            ),
        ));
    }
    if spec.autoscaling && !(spec.min_count..=spec.max_count).contains(&spec.count) {
        return Err(Error::validation_for_field(
            name,
            "count",
            format!(
                "node pool {name} count {} is outside {}..={}",
                spec.count, spec.min_count, spec.max_count
            ),
        ));
    }
    Ok(())
}

fn update_request(
    cluster: &ClusterRef,
    request: &ClusterUpdateRequest,
    name: &str,
    spec: &NodePoolSpec,
) -> NodePoolUpdateRequest {
    NodePoolUpdateRequest {
        provider_secret_ref: request.secret_ref.clone(),
        region: request.region.clone(),
        stack_name: stack_name(&cluster.cluster_name, name),
        organization_id: request.organization_id,
        cluster_id: cluster.cluster_id,
        cluster_secret_ref: cluster.cluster_secret_ref.clone(),
        cluster_name: cluster.cluster_name.clone(),
        node_pool_name: name.to_string(),
        node_volume_size: spec.volume_size,
        node_image: Some(spec.image.clone()).filter(|i| !i.is_empty()),
        update_options: UpdateOptions::default(),
        cluster_tags: request.tags.clone(),
    }
}
