//! Node pool activities: stack introspection, stack updates and status rows

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use keel_common::model::{NodePoolStatus, UpdateOptions};
use keel_common::{Error, Result, CLUSTER_TAG, NODE_POOL_VERSION_TAG};
use keel_workflow::ActivityContext;

use super::Context;
use crate::cloud::{is_no_update, CloudTarget, StackParameter, StackUpdate};
use crate::node_pool::select_volume_size;
use crate::polling::{classify_stack_status, poll_until, PollState, StackState};

/// Node pool stack parameter keys
pub mod params {
    /// Machine image of the nodes
    pub const NODE_IMAGE_ID: &str = "NodeImageId";
    /// Root volume size in GiB
    pub const NODE_VOLUME_SIZE: &str = "NodeVolumeSize";
    /// Fingerprint of the launch inputs
    pub const NODE_POOL_VERSION: &str = "NodePoolVersion";
    /// Owning cluster
    pub const CLUSTER_NAME: &str = "ClusterName";
    /// Node pool name
    pub const NODE_POOL_NAME: &str = "NodePoolName";
    /// Nodes replaced at once during a rolling update
    pub const MAX_BATCH_SIZE: &str = "MaxBatchSize";
    /// Extra nodes allowed during a rolling update
    pub const MAX_SURGE: &str = "MaxSurge";
}

/// Launch inputs currently applied to a node pool stack
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParameters {
    /// Current machine image
    pub image: Option<String>,
    /// Current root volume size
    pub volume_size: Option<u32>,
}

impl LaunchParameters {
    /// Extract the launch inputs from a stack's parameters
    pub fn from_parameters(stack_name: &str, parameters: &[StackParameter]) -> Result<Self> {
        let mut launch = Self::default();
        for p in parameters.iter().filter(|p| !p.value.is_empty()) {
            match p.key.as_str() {
                params::NODE_IMAGE_ID => launch.image = Some(p.value.clone()),
                params::NODE_VOLUME_SIZE => {
                    let size = p.value.parse::<u32>().map_err(|e| {
                        Error::validation_for_field(
                            stack_name,
                            params::NODE_VOLUME_SIZE,
                            format!("stack volume size {:?} is not a number: {}", p.value, e),
                        )
                    })?;
                    launch.volume_size = Some(size);
                }
                _ => {}
            }
        }
        Ok(launch)
    }
}

/// Read the current launch inputs of a node pool stack
pub async fn get_stack_parameters(
    ctx: &Context,
    target: &CloudTarget,
    stack_name: &str,
) -> Result<LaunchParameters> {
    let parameters = ctx.stacks.stack_parameters(target, stack_name).await?;
    let launch = LaunchParameters::from_parameters(stack_name, &parameters)?;
    debug!(stack = %stack_name, image = ?launch.image, volume_size = ?launch.volume_size, "read stack parameters");
    Ok(launch)
}

/// Inputs for choosing a node pool's root volume size
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectVolumeInput {
    /// Region and credentials
    pub target: CloudTarget,
    /// Node pool name
    pub node_pool: String,
    /// Image the pool will launch
    pub image: String,
    /// Size requested by the update, if any
    pub requested: Option<u32>,
    /// Size currently applied to the stack, if known
    pub current: Option<u32>,
}

/// Choose a volume size large enough for the pool's image
pub async fn select_node_volume_size(ctx: &Context, input: &SelectVolumeInput) -> Result<u32> {
    let image_size = ctx
        .images
        .root_volume_size(&input.target, &input.image)
        .await?;
    let size = select_volume_size(
        &input.node_pool,
        input.requested,
        input.current,
        image_size,
        ctx.config.default_volume_size,
    )?;
    debug!(node_pool = %input.node_pool, image_size = image_size, volume_size = size, "selected volume size");
    Ok(size)
}

/// Everything a node pool stack update applies
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StackUpdateInput {
    /// Region and credentials
    pub target: CloudTarget,
    /// Stack to update
    pub stack_name: String,
    /// Owning cluster
    pub cluster_name: String,
    /// Node pool name
    pub node_pool: String,
    /// Machine image
    pub image: String,
    /// Root volume size in GiB
    pub volume_size: u32,
    /// Launch input fingerprint
    pub version: String,
    /// Rolling update settings
    pub update_options: UpdateOptions,
    /// Extra stack tags
    pub tags: BTreeMap<String, String>,
}

/// Parameters and tags for a node pool stack update
///
/// Rolling update settings are only sent when set, so the stack keeps its
/// own defaults otherwise.
pub fn build_stack_update(input: &StackUpdateInput) -> StackUpdate {
    let mut parameters = vec![
        StackParameter::new(params::CLUSTER_NAME, &input.cluster_name),
        StackParameter::new(params::NODE_POOL_NAME, &input.node_pool),
        StackParameter::new(params::NODE_IMAGE_ID, &input.image),
        StackParameter::new(params::NODE_VOLUME_SIZE, input.volume_size.to_string()),
        StackParameter::new(params::NODE_POOL_VERSION, &input.version),
    ];
    if input.update_options.max_batch_size > 0 {
        parameters.push(StackParameter::new(
            params::MAX_BATCH_SIZE,
            input.update_options.max_batch_size.to_string(),
        ));
    }
    if input.update_options.max_surge > 0 {
        parameters.push(StackParameter::new(
            params::MAX_SURGE,
            input.update_options.max_surge.to_string(),
        ));
    }

    let mut tags = input.tags.clone();
    tags.insert(CLUSTER_TAG.to_string(), input.cluster_name.clone());
    tags.insert(NODE_POOL_VERSION_TAG.to_string(), input.version.clone());

    StackUpdate {
        stack_name: input.stack_name.clone(),
        parameters,
        tags,
    }
}

/// Submit a node pool stack update
///
/// Returns `false` when the provider reports there is nothing to update.
pub async fn update_node_pool_stack(
    ctx: &Context,
    actx: &ActivityContext,
    input: &StackUpdateInput,
) -> Result<bool> {
    let update = build_stack_update(input);
    match ctx
        .stacks
        .update_stack(&input.target, &update, &actx.idempotency_token())
        .await
    {
        Ok(()) => {
            info!(stack = %input.stack_name, version = %input.version, "stack update submitted");
            Ok(true)
        }
        Err(e) if is_no_update(&e) => {
            info!(stack = %input.stack_name, "stack already up to date");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Poll a node pool stack until its update completes
///
/// Failed and rolled back stacks are terminal infrastructure errors.
pub async fn wait_stack_completion(
    ctx: &Context,
    actx: &ActivityContext,
    target: &CloudTarget,
    stack_name: &str,
) -> Result<()> {
    poll_until(actx, &ctx.poll_config(), stack_name, move || async move {
        let stack = ctx.stacks.describe_stack(target, stack_name).await?;
        match classify_stack_status(&stack.status) {
            StackState::Complete => Ok(PollState::Done(())),
            StackState::InProgress => Ok(PollState::Pending(stack.status)),
            StackState::Failed => Err(Error::infrastructure(
                stack_name,
                stack.status,
                stack.reason,
            )),
        }
    })
    .await
}

/// Overwrite a node pool status row
pub async fn set_node_pool_status(
    ctx: &Context,
    cluster_id: u64,
    node_pool: &str,
    status: NodePoolStatus,
    message: &str,
) -> Result<()> {
    debug!(cluster_id = cluster_id, node_pool = %node_pool, status = %status, "setting node pool status");
    ctx.store
        .set_node_pool_status(cluster_id, node_pool, status, message)
        .await
}
