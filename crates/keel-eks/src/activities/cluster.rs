//! Cluster-level activities: status writes, version updates and addons

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keel_common::model::ClusterStatus;
use keel_common::{Error, Result};
use keel_workflow::ActivityContext;

use super::Context;
use crate::addon::select_latest_version;
use crate::cloud::{CloudTarget, UpdateStatus};
use crate::polling::{poll_until, PollState};

/// Overwrite the cluster status row
pub async fn set_cluster_status(
    ctx: &Context,
    cluster_id: u64,
    status: ClusterStatus,
    message: &str,
) -> Result<()> {
    debug!(cluster_id = cluster_id, status = %status, message = %message, "setting cluster status");
    ctx.store
        .set_cluster_status(cluster_id, status, message)
        .await
}

/// Submit a control plane version update, returning the provider update ID
pub async fn submit_version_update(
    ctx: &Context,
    actx: &ActivityContext,
    target: &CloudTarget,
    cluster_name: &str,
    version: &str,
) -> Result<String> {
    let update_id = ctx
        .clusters
        .update_cluster_version(target, cluster_name, version, &actx.idempotency_token())
        .await?;
    info!(cluster = %cluster_name, version = %version, update_id = %update_id, "version update submitted");
    Ok(update_id)
}

/// A provider update to wait for
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WaitUpdateInput {
    /// Region and credentials
    pub target: CloudTarget,
    /// Provider cluster name
    pub cluster_name: String,
    /// Update to wait for
    pub update_id: String,
    /// Addon the update belongs to, if it is an addon update
    pub addon: Option<String>,
}

/// Poll a cluster or addon update until it finishes
///
/// A failed or cancelled update is terminal and carries the provider's error
/// details.
pub async fn wait_update_completion(
    ctx: &Context,
    actx: &ActivityContext,
    input: &WaitUpdateInput,
) -> Result<()> {
    let resource = match &input.addon {
        Some(addon) => format!("{}/{}", input.cluster_name, addon),
        None => input.cluster_name.clone(),
    };
    let resource = resource.as_str();

    poll_until(actx, &ctx.poll_config(), resource, move || async move {
        let update = ctx
            .clusters
            .describe_update(
                &input.target,
                &input.cluster_name,
                &input.update_id,
                input.addon.clone(),
            )
            .await?;
        match update.status {
            UpdateStatus::Successful => Ok(PollState::Done(())),
            UpdateStatus::InProgress => Ok(PollState::Pending("InProgress".to_string())),
            UpdateStatus::Failed | UpdateStatus::Cancelled => Err(Error::update_failed(
                resource,
                &update.id,
                format!("{:?}", update.status),
                if update.errors.is_empty() {
                    "provider reported no details".to_string()
                } else {
                    update.errors.join("; ")
                },
            )),
        }
    })
    .await
}

/// Newest compatible version of an addon, `None` when nothing should change
///
/// Addons that are not installed on the cluster are left alone.
pub async fn select_addon_version(
    ctx: &Context,
    target: &CloudTarget,
    cluster_name: &str,
    addon: &str,
    cluster_version: &str,
) -> Result<Option<String>> {
    let Some(current) = ctx
        .clusters
        .describe_addon(target, cluster_name, addon)
        .await?
    else {
        info!(cluster = %cluster_name, addon = %addon, "addon not installed, skipping");
        return Ok(None);
    };

    let available = ctx.clusters.list_addon_versions(target, addon).await?;
    let selected = select_latest_version(&available, &current, cluster_version)?;
    if selected == current {
        debug!(cluster = %cluster_name, addon = %addon, version = %current, "addon already current");
        return Ok(None);
    }

    info!(
        cluster = %cluster_name,
        addon = %addon,
        from = %current,
        to = %selected,
        "addon update selected"
    );
    Ok(Some(selected))
}

/// An addon version change
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonUpdateInput {
    /// Region and credentials
    pub target: CloudTarget,
    /// Provider cluster name
    pub cluster_name: String,
    /// Addon name
    pub addon: String,
    /// Version to install
    pub version: String,
}

/// Submit an addon update, returning the provider update ID
pub async fn submit_addon_update(
    ctx: &Context,
    actx: &ActivityContext,
    input: &AddonUpdateInput,
) -> Result<String> {
    ctx.clusters
        .update_addon(
            &input.target,
            &input.cluster_name,
            &input.addon,
            &input.version,
            &actx.idempotency_token(),
        )
        .await
}

/// Record the cluster's new Kubernetes version
pub async fn save_cluster_version(ctx: &Context, cluster_id: u64, version: &str) -> Result<()> {
    ctx.store.set_cluster_version(cluster_id, version).await
}
