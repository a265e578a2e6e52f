//! Control plane version update pipeline
//!
//! New → VersionUpdateSubmitted → WaitingForCompletion → AddonsUpdated →
//! VersionPersisted → Running. Any failure moves the cluster to Warning with
//! the innermost error message. The pipeline itself never retries; each
//! activity retries under its own policy.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use keel_common::model::{messages, ClusterStatus, ClusterVersionUpdateRequest};
use keel_common::Result;
use keel_workflow::WorkflowContext;

use super::addons::update_addons;
use crate::activities::{
    save_cluster_version, set_cluster_status, submit_version_update, wait_update_completion,
    Context, WaitUpdateInput,
};
use crate::cloud::CloudTarget;

/// Stages of a control plane version update
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum ClusterVersionUpdateState {
    /// Nothing submitted yet
    New,
    /// Provider accepted the version update
    VersionUpdateSubmitted,
    /// Polling the version update
    WaitingForCompletion,
    /// Managed addons brought to compatible versions
    AddonsUpdated,
    /// New version recorded in the platform store
    VersionPersisted,
    /// Update finished
    Running,
    /// Update failed
    Warning,
}

impl fmt::Display for ClusterVersionUpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Move a cluster's control plane to `request.target_version`
///
/// Returns the final state. On failure the cluster status is set to Warning
/// before the error is returned.
#[instrument(
    skip(wctx, ctx, request),
    fields(run_id = %wctx.run_id(), cluster_id = request.cluster_id, cluster = %request.cluster_name)
)]
pub async fn update_cluster_version(
    wctx: &WorkflowContext,
    ctx: &Context,
    request: &ClusterVersionUpdateRequest,
) -> Result<ClusterVersionUpdateState> {
    let mut state = ClusterVersionUpdateState::New;
    match run(wctx, ctx, request, &mut state).await {
        Ok(()) => {
            info!(version = %request.target_version, "cluster version update finished");
            Ok(state)
        }
        Err(e) => {
            warn!(state = %state, error = %e, "cluster version update failed");
            let message = e.root_message();
            let detached = wctx.disconnected();
            let policy = &ctx.config.retry.status_write;
            if let Err(write_err) = detached
                .execute_activity("set-cluster-status", policy, |_| {
                    set_cluster_status(ctx, request.cluster_id, ClusterStatus::Warning, &message)
                })
                .await
            {
                error!(error = %write_err, "failed to record cluster warning");
            }
            Err(e)
        }
    }
}

async fn run(
    wctx: &WorkflowContext,
    ctx: &Context,
    request: &ClusterVersionUpdateRequest,
    state: &mut ClusterVersionUpdateState,
) -> Result<()> {
    let policies = &ctx.config.retry;
    let target = &CloudTarget::new(&request.region, &request.provider_secret_ref);
    let cluster_id = request.cluster_id;

    wctx.execute_activity("set-cluster-status", &policies.status_write, |_| {
        set_cluster_status(
            ctx,
            cluster_id,
            ClusterStatus::Updating,
            messages::UPDATING_VERSION,
        )
    })
    .await?;

    let update_id: String = wctx
        .execute_activity(
            "submit-version-update",
            &policies.update_cluster_version,
            |actx| async move {
                submit_version_update(
                    ctx,
                    &actx,
                    target,
                    &request.cluster_name,
                    &request.target_version,
                )
                .await
            },
        )
        .await?;
    *state = ClusterVersionUpdateState::VersionUpdateSubmitted;

    let wait = &WaitUpdateInput {
        target: target.clone(),
        cluster_name: request.cluster_name.clone(),
        update_id,
        addon: None,
    };
    *state = ClusterVersionUpdateState::WaitingForCompletion;
    wctx.execute_activity("wait-version-update", &policies.wait_update, |actx| async move {
        wait_update_completion(ctx, &actx, wait).await
    })
    .await?;

    let updated = update_addons(
        wctx,
        ctx,
        target,
        &request.cluster_name,
        &request.target_version,
    )
    .await?;
    *state = ClusterVersionUpdateState::AddonsUpdated;
    info!(addons = ?updated, "managed addons updated");

    wctx.execute_activity(
        "save-cluster-version",
        &policies.save_cluster_version,
        |_| save_cluster_version(ctx, cluster_id, &request.target_version),
    )
    .await?;
    *state = ClusterVersionUpdateState::VersionPersisted;

    wctx.execute_activity("set-cluster-status", &policies.status_write, |_| {
        set_cluster_status(ctx, cluster_id, ClusterStatus::Running, messages::RUNNING)
    })
    .await?;
    *state = ClusterVersionUpdateState::Running;

    Ok(())
}
