//! Activities: the retryable side-effecting steps of the update pipelines
//!
//! Each activity is a small async function over the shared [`Context`]. The
//! pipelines run them through [`keel_workflow::WorkflowContext::execute_activity`],
//! which records their outputs for replay, so inputs and outputs are plain
//! serde records.

mod cluster;
mod node_pool;

pub use cluster::{
    save_cluster_version, select_addon_version, set_cluster_status, submit_addon_update,
    submit_version_update, wait_update_completion, AddonUpdateInput, WaitUpdateInput,
};
pub use node_pool::{
    build_stack_update, get_stack_parameters, select_node_volume_size, set_node_pool_status,
    update_node_pool_stack, wait_stack_completion, LaunchParameters, SelectVolumeInput,
    StackUpdateInput, params,
};

use std::sync::Arc;

use crate::cloud::{ClusterApi, ClusterStore, ImageApi, StackApi};
use crate::config::OrchestratorConfig;
use crate::polling::PollConfig;

/// Collaborators and settings shared by all activities
#[derive(Clone)]
pub struct Context {
    /// Managed cluster API
    pub clusters: Arc<dyn ClusterApi>,
    /// Infrastructure stack API
    pub stacks: Arc<dyn StackApi>,
    /// Machine image API
    pub images: Arc<dyn ImageApi>,
    /// Cluster and node pool status rows
    pub store: Arc<dyn ClusterStore>,
    /// Orchestrator settings
    pub config: Arc<OrchestratorConfig>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(
        clusters: Arc<dyn ClusterApi>,
        stacks: Arc<dyn StackApi>,
        images: Arc<dyn ImageApi>,
        store: Arc<dyn ClusterStore>,
    ) -> ContextBuilder {
        ContextBuilder {
            clusters,
            stacks,
            images,
            store,
            config: None,
        }
    }

    /// Poll cadence derived from the configuration
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::from(self.config.as_ref())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```text
/// let ctx = Context::builder(clusters, stacks, images, store)
///     .config(OrchestratorConfig::from_file("keel.yaml")?)
///     .build();
/// ```
pub struct ContextBuilder {
    clusters: Arc<dyn ClusterApi>,
    stacks: Arc<dyn StackApi>,
    images: Arc<dyn ImageApi>,
    store: Arc<dyn ClusterStore>,
    config: Option<OrchestratorConfig>,
}

impl ContextBuilder {
    /// Use a specific configuration instead of the defaults
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            clusters: self.clusters,
            stacks: self.stacks,
            images: self.images,
            store: self.store,
            config: Arc::new(self.config.unwrap_or_default()),
        }
    }
}
