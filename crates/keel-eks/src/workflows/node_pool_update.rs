//! Node pool stack update pipeline
//!
//! Start → InfraIntrospection (only when the request omits the image or the
//! volume size) → VolumeSizeSelection → VersionRecalculated →
//! StackUpdateSubmitted → WaitingForStackComplete → Done.
//!
//! When the stack reports nothing to change the wait is skipped. The final
//! status writes always run, on a context detached from cancellation: success
//! leaves the cluster Running and the pool ready, anything else leaves the
//! cluster in Warning and the pool in error.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use keel_common::model::{messages, ClusterStatus, NodePoolStatus, NodePoolUpdateRequest};
use keel_common::{Error, Result};
use keel_workflow::WorkflowContext;

use crate::activities::{
    get_stack_parameters, select_node_volume_size, set_cluster_status, set_node_pool_status,
    update_node_pool_stack, wait_stack_completion, Context, LaunchParameters, SelectVolumeInput,
    StackUpdateInput,
};
use crate::cloud::CloudTarget;
use crate::node_pool::node_pool_version;

/// Stages of a node pool update
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum NodePoolUpdateState {
    /// Nothing done yet
    Start,
    /// Reading the current stack parameters
    InfraIntrospection,
    /// Choosing the root volume size
    VolumeSizeSelection,
    /// Launch fingerprint computed
    VersionRecalculated,
    /// Stack update accepted
    StackUpdateSubmitted,
    /// Polling the stack
    WaitingForStackComplete,
    /// Update finished
    Done,
}

impl fmt::Display for NodePoolUpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a finished node pool update applied
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolUpdateOutcome {
    /// Machine image of the pool
    pub image: String,
    /// Root volume size in GiB
    pub volume_size: u32,
    /// Launch fingerprint written to the stack
    pub version: String,
    /// Whether the stack actually changed
    pub changed: bool,
}

/// Roll a node pool's stack to the requested image and volume size
#[instrument(
    skip(wctx, ctx, request),
    fields(
        run_id = %wctx.run_id(),
        cluster_id = request.cluster_id,
        node_pool = %request.node_pool_name
    )
)]
pub async fn update_node_pool(
    wctx: &WorkflowContext,
    ctx: &Context,
    request: &NodePoolUpdateRequest,
) -> Result<NodePoolUpdateOutcome> {
    let mut state = NodePoolUpdateState::Start;
    let result = run(wctx, ctx, request, &mut state).await;

    let detached = wctx.disconnected();
    match result {
        Ok(outcome) => {
            finish(&detached, ctx, request, ClusterStatus::Running, messages::RUNNING).await?;
            info!(
                version = %outcome.version,
                changed = outcome.changed,
                "node pool update finished"
            );
            Ok(outcome)
        }
        Err(e) => {
            if e.is_cancelled() {
                warn!(state = %state, "node pool update cancelled");
            } else {
                warn!(state = %state, error = %e, "node pool update failed");
            }
            let message = e.root_message();
            if let Err(write_err) =
                finish(&detached, ctx, request, ClusterStatus::Warning, &message).await
            {
                error!(error = %write_err, "failed to record node pool failure");
            }
            Err(e)
        }
    }
}

/// Final status writes for the cluster and the pool
async fn finish(
    wctx: &WorkflowContext,
    ctx: &Context,
    request: &NodePoolUpdateRequest,
    cluster_status: ClusterStatus,
    message: &str,
) -> Result<()> {
    let policy = &ctx.config.retry.status_write;
    let pool_status = if cluster_status == ClusterStatus::Running {
        NodePoolStatus::Ready
    } else {
        NodePoolStatus::Error
    };
    let pool_message = if pool_status == NodePoolStatus::Ready {
        ""
    } else {
        message
    };

    wctx.execute_activity("set-node-pool-status", policy, |_| {
        set_node_pool_status(
            ctx,
            request.cluster_id,
            &request.node_pool_name,
            pool_status,
            pool_message,
        )
    })
    .await?;
    wctx.execute_activity("set-cluster-status", policy, |_| {
        set_cluster_status(ctx, request.cluster_id, cluster_status, message)
    })
    .await
}

async fn run(
    wctx: &WorkflowContext,
    ctx: &Context,
    request: &NodePoolUpdateRequest,
    state: &mut NodePoolUpdateState,
) -> Result<NodePoolUpdateOutcome> {
    let policies = &ctx.config.retry;
    let target = &CloudTarget::new(&request.region, &request.provider_secret_ref);
    let cluster_id = request.cluster_id;
    let stack_name = request.stack_name.as_str();

    wctx.execute_activity("set-cluster-status", &policies.status_write, |_| {
        set_cluster_status(
            ctx,
            cluster_id,
            ClusterStatus::Updating,
            messages::UPDATING_NODE_POOL,
        )
    })
    .await?;
    wctx.execute_activity("set-node-pool-status", &policies.status_write, |_| {
        set_node_pool_status(
            ctx,
            cluster_id,
            &request.node_pool_name,
            NodePoolStatus::Updating,
            messages::UPDATING_NODE_POOL,
        )
    })
    .await?;

    let requested_image = request.node_image.as_deref().filter(|i| !i.is_empty());
    let current = if requested_image.is_none() || request.node_volume_size.is_none() {
        *state = NodePoolUpdateState::InfraIntrospection;
        wctx.execute_activity("get-stack-parameters", &policies.introspection, |_| {
            get_stack_parameters(ctx, target, stack_name)
        })
        .await?
    } else {
        LaunchParameters::default()
    };

    let image = match (requested_image, current.image.filter(|i| !i.is_empty())) {
        (Some(image), _) => image.to_string(),
        (None, Some(image)) => image,
        (None, None) => return Err(Error::not_found("node image", stack_name)),
    };

    *state = NodePoolUpdateState::VolumeSizeSelection;
    let volume_input = &SelectVolumeInput {
        target: target.clone(),
        node_pool: request.node_pool_name.clone(),
        image: image.clone(),
        requested: request.node_volume_size,
        current: current.volume_size,
    };
    let volume_size: u32 = wctx
        .execute_activity("select-volume-size", &policies.introspection, |_| {
            select_node_volume_size(ctx, volume_input)
        })
        .await?;

    let version = node_pool_version(&image, volume_size);
    *state = NodePoolUpdateState::VersionRecalculated;

    let update = &StackUpdateInput {
        target: target.clone(),
        stack_name: stack_name.to_string(),
        cluster_name: request.cluster_name.clone(),
        node_pool: request.node_pool_name.clone(),
        image: image.clone(),
        volume_size,
        version: version.clone(),
        update_options: request.update_options,
        tags: request.cluster_tags.clone(),
    };
    let changed: bool = wctx
        .execute_activity("update-stack", &policies.update_stack, |actx| async move {
            update_node_pool_stack(ctx, &actx, update).await
        })
        .await?;
    *state = NodePoolUpdateState::StackUpdateSubmitted;

    if changed {
        *state = NodePoolUpdateState::WaitingForStackComplete;
        wctx.execute_activity("wait-stack", &policies.wait_stack, |actx| async move {
            wait_stack_completion(ctx, &actx, target, stack_name).await
        })
        .await?;
    }
    *state = NodePoolUpdateState::Done;

    Ok(NodePoolUpdateOutcome {
        image,
        volume_size,
        version,
        changed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::params;
    use crate::cloud::{
        MockImageApi, MockStackApi, StackDescription, StackParameter, NO_UPDATE_CODE,
    };
    use crate::testing::{RecordingStore, TestContext};
    use keel_common::model::UpdateOptions;
    use keel_workflow::MemoryStepLog;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn request() -> NodePoolUpdateRequest {
        NodePoolUpdateRequest {
            provider_secret_ref: "secret-1".into(),
            region: "us-west-2".into(),
            stack_name: "keel-eks-nodepool-prod-workers".into(),
            organization_id: 1,
            cluster_id: 7,
            cluster_secret_ref: "kubeconfig-7".into(),
            cluster_name: "prod".into(),
            node_pool_name: "workers".into(),
            node_volume_size: None,
            node_image: Some("ami-new".into()),
            update_options: UpdateOptions {
                max_batch_size: 2,
                max_surge: 0,
            },
            cluster_tags: [("team".to_string(), "infra".to_string())].into(),
        }
    }

    fn current_stack() -> Vec<StackParameter> {
        vec![
            StackParameter::new(params::NODE_IMAGE_ID, "ami-old"),
            StackParameter::new(params::NODE_VOLUME_SIZE, "20"),
        ]
    }

    fn images(root_size: u32) -> MockImageApi {
        let mut images = MockImageApi::new();
        images
            .expect_root_volume_size()
            .returning(move |_, _| Ok(root_size));
        images
    }

    fn stack_status(status: &str) -> StackDescription {
        StackDescription {
            status: status.to_string(),
            reason: String::new(),
        }
    }

    /// Story: a new image is rolled out, keeping the pool's current volume
    /// size, and the stack is polled until the update completes
    #[tokio::test(start_paused = true)]
    async fn story_node_pool_rolls_to_new_image() {
        let expected_version = node_pool_version("ami-new", 20);
        let v = expected_version.clone();
        let polls = Arc::new(AtomicU32::new(0));
        let p = polls.clone();

        let mut stacks = MockStackApi::new();
        stacks
            .expect_stack_parameters()
            .times(1)
            .returning(|_, _| Ok(current_stack()));
        stacks
            .expect_update_stack()
            .withf(move |_, update, _| {
                let value = |key: &str| {
                    update
                        .parameters
                        .iter()
                        .find(|p| p.key == key)
                        .map(|p| p.value.clone())
                };
                value(params::NODE_IMAGE_ID).as_deref() == Some("ami-new")
                    && value(params::NODE_VOLUME_SIZE).as_deref() == Some("20")
                    && value(params::NODE_POOL_VERSION).as_deref() == Some(v.as_str())
                    && value(params::MAX_BATCH_SIZE).as_deref() == Some("2")
                    && value(params::MAX_SURGE).is_none()
                    && update.tags.get("team").map(String::as_str) == Some("infra")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        stacks.expect_describe_stack().returning(move |_, _| {
            let n = p.fetch_add(1, Ordering::SeqCst);
            Ok(stack_status(if n < 2 {
                "UPDATE_IN_PROGRESS"
            } else {
                "UPDATE_COMPLETE"
            }))
        });

        let store = Arc::new(RecordingStore::default());
        let ctx = TestContext::new()
            .stacks(stacks)
            .images(images(8))
            .store(store.clone())
            .build();
        let wctx = WorkflowContext::new("np-1", Arc::new(MemoryStepLog::new()));

        let outcome = update_node_pool(&wctx, &ctx, &request()).await.unwrap();

        assert_eq!(
            outcome,
            NodePoolUpdateOutcome {
                image: "ami-new".into(),
                volume_size: 20,
                version: expected_version,
                changed: true,
            }
        );
        assert_eq!(polls.load(Ordering::SeqCst), 3);
        assert_eq!(
            store.cluster_statuses(),
            vec![ClusterStatus::Updating, ClusterStatus::Running]
        );
        assert_eq!(
            store.node_pool_statuses("workers"),
            vec![NodePoolStatus::Updating, NodePoolStatus::Ready]
        );
    }

    /// Story: an update that changes nothing skips the wait entirely
    #[tokio::test(start_paused = true)]
    async fn story_unchanged_stack_skips_wait() {
        let mut stacks = MockStackApi::new();
        stacks.expect_update_stack().times(1).returning(|_, u, _| {
            Err(Error::provider_with_code(
                &u.stack_name,
                "cloudformation",
                NO_UPDATE_CODE,
                "No updates are to be performed.",
            ))
        });
        stacks.expect_stack_parameters().times(0);
        stacks.expect_describe_stack().times(0);

        let store = Arc::new(RecordingStore::default());
        let ctx = TestContext::new()
            .stacks(stacks)
            .images(images(8))
            .store(store.clone())
            .build();
        let wctx = WorkflowContext::new("np-2", Arc::new(MemoryStepLog::new()));
        let request = NodePoolUpdateRequest {
            node_volume_size: Some(50),
            ..request()
        };

        let outcome = update_node_pool(&wctx, &ctx, &request).await.unwrap();

        assert!(!outcome.changed);
        assert_eq!(outcome.volume_size, 50);
        assert_eq!(
            store.last_cluster_status(),
            Some((ClusterStatus::Running, messages::RUNNING.to_string()))
        );
    }

    /// Story: a rolled back stack leaves the cluster in Warning and the pool
    /// in error, both carrying the provider's reason
    #[tokio::test(start_paused = true)]
    async fn story_rolled_back_stack_sets_warning() {
        let mut stacks = MockStackApi::new();
        stacks
            .expect_stack_parameters()
            .returning(|_, _| Ok(current_stack()));
        stacks.expect_update_stack().returning(|_, _, _| Ok(()));
        stacks.expect_describe_stack().returning(|_, _| {
            Ok(StackDescription {
                status: "UPDATE_ROLLBACK_COMPLETE".into(),
                reason: "Instance failed to join the cluster".into(),
            })
        });

        let store = Arc::new(RecordingStore::default());
        let ctx = TestContext::new()
            .stacks(stacks)
            .images(images(8))
            .store(store.clone())
            .build();
        let wctx = WorkflowContext::new("np-3", Arc::new(MemoryStepLog::new()));

        let err = update_node_pool(&wctx, &ctx, &request())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Infrastructure { .. }));
        assert_eq!(
            store.last_cluster_status(),
            Some((
                ClusterStatus::Warning,
                "Instance failed to join the cluster".to_string()
            ))
        );
        assert_eq!(
            store.node_pool_statuses("workers"),
            vec![NodePoolStatus::Updating, NodePoolStatus::Error]
        );
    }

    #[tokio::test]
    async fn missing_image_everywhere_is_not_found() {
        let mut stacks = MockStackApi::new();
        stacks
            .expect_stack_parameters()
            .returning(|_, _| Ok(vec![StackParameter::new(params::NODE_VOLUME_SIZE, "30")]));
        stacks.expect_update_stack().times(0);

        let store = Arc::new(RecordingStore::default());
        let ctx = TestContext::new()
            .stacks(stacks)
            .store(store.clone())
            .build();
        let wctx = WorkflowContext::new("np-4", Arc::new(MemoryStepLog::new()));
        let request = NodePoolUpdateRequest {
            node_image: None,
            ..request()
        };

        let err = update_node_pool(&wctx, &ctx, &request).await.unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(store.cluster_statuses().last(), Some(&ClusterStatus::Warning));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_image_keeps_current_stack_image() {
        let mut stacks = MockStackApi::new();
        stacks
            .expect_stack_parameters()
            .times(1)
            .returning(|_, _| Ok(current_stack()));
        stacks
            .expect_update_stack()
            .withf(|_, update, _| {
                update
                    .parameters
                    .iter()
                    .any(|p| p.key == params::NODE_IMAGE_ID && p.value == "ami-old")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        stacks
            .expect_describe_stack()
            .returning(|_, _| Ok(stack_status("UPDATE_COMPLETE")));
        let mut image_sizes = MockImageApi::new();
        image_sizes
            .expect_root_volume_size()
            .withf(|_, image| image == "ami-old")
            .returning(|_, _| Ok(8));

        let ctx = TestContext::new().stacks(stacks).images(image_sizes).build();
        let wctx = WorkflowContext::new("np-4b", Arc::new(MemoryStepLog::new()));
        let request = NodePoolUpdateRequest {
            node_image: Some(String::new()),
            node_volume_size: Some(50),
            ..request()
        };

        let outcome = update_node_pool(&wctx, &ctx, &request).await.unwrap();
        assert_eq!(outcome.image, "ami-old");
        assert_eq!(outcome.volume_size, 50);
    }

    #[tokio::test]
    async fn volume_below_image_size_is_rejected_before_stack_update() {
        let mut stacks = MockStackApi::new();
        stacks.expect_update_stack().times(0);
        let ctx = TestContext::new().stacks(stacks).images(images(100)).build();
        let wctx = WorkflowContext::new("np-5", Arc::new(MemoryStepLog::new()));
        let request = NodePoolUpdateRequest {
            node_volume_size: Some(40),
            ..request()
        };

        let err = update_node_pool(&wctx, &ctx, &request).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    /// Story: cancelling a run mid-wait still records the failure, because
    /// the final status writes ignore cancellation
    #[tokio::test(start_paused = true)]
    async fn story_cancellation_during_wait_sets_warning() {
        let mut stacks = MockStackApi::new();
        stacks
            .expect_stack_parameters()
            .returning(|_, _| Ok(current_stack()));
        stacks.expect_update_stack().returning(|_, _, _| Ok(()));
        stacks
            .expect_describe_stack()
            .returning(|_, _| Ok(stack_status("UPDATE_IN_PROGRESS")));

        let store = Arc::new(RecordingStore::default());
        let ctx = TestContext::new()
            .stacks(stacks)
            .images(images(8))
            .store(store.clone())
            .build();
        let cancel = CancellationToken::new();
        let wctx = WorkflowContext::new("np-6", Arc::new(MemoryStepLog::new()))
            .with_cancellation(cancel.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            cancel.cancel();
        });

        let err = update_node_pool(&wctx, &ctx, &request())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(store.cluster_statuses().last(), Some(&ClusterStatus::Warning));
        assert_eq!(
            store.node_pool_statuses("workers").last(),
            Some(&NodePoolStatus::Error)
        );
    }

    /// Story: two updates of the same cluster overwrite each other's status;
    /// whichever finishes last decides what the cluster shows
    #[tokio::test(start_paused = true)]
    async fn story_last_status_write_wins() {
        let store = Arc::new(RecordingStore::default());

        let mut failing = MockStackApi::new();
        failing
            .expect_stack_parameters()
            .returning(|_, _| Ok(current_stack()));
        failing.expect_update_stack().returning(|_, u, _| {
            Err(Error::provider_permanent(
                &u.stack_name,
                "cloudformation",
                "stack is locked",
            ))
        });
        let first = TestContext::new()
            .stacks(failing)
            .images(images(8))
            .store(store.clone())
            .build();
        update_node_pool(
            &WorkflowContext::new("np-7a", Arc::new(MemoryStepLog::new())),
            &first,
            &request(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            store.last_cluster_status().map(|(s, _)| s),
            Some(ClusterStatus::Warning)
        );

        let mut healthy = MockStackApi::new();
        healthy
            .expect_stack_parameters()
            .returning(|_, _| Ok(current_stack()));
        healthy.expect_update_stack().returning(|_, _, _| Ok(()));
        healthy
            .expect_describe_stack()
            .returning(|_, _| Ok(stack_status("UPDATE_COMPLETE")));
        let second = TestContext::new()
            .stacks(healthy)
            .images(images(8))
            .store(store.clone())
            .build();
        update_node_pool(
            &WorkflowContext::new("np-7b", Arc::new(MemoryStepLog::new())),
            &second,
            &request(),
        )
        .await
        .unwrap();

        assert_eq!(
            store.last_cluster_status().map(|(s, _)| s),
            Some(ClusterStatus::Running)
        );
    }
}
