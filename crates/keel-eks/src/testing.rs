//! Test fixtures shared by the activity and pipeline tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use keel_common::model::{ClusterStatus, NodePoolStatus};
use keel_common::Result;
use keel_workflow::ActivityRetryPolicy;

use crate::activities::Context;
use crate::cloud::{ClusterStore, MockClusterApi, MockImageApi, MockStackApi};
use crate::config::{ActivityPolicies, OrchestratorConfig};

/// Policy that runs once without backoff
pub(crate) fn no_retry() -> ActivityRetryPolicy {
    ActivityRetryPolicy {
        initial_interval_secs: 0,
        maximum_interval_secs: 0,
        maximum_attempts: 1,
        ..Default::default()
    }
}

/// Policy that retries immediately
pub(crate) fn quick_retry(attempts: u32) -> ActivityRetryPolicy {
    ActivityRetryPolicy {
        maximum_attempts: attempts,
        ..no_retry()
    }
}

/// Default configuration with retries that don't sleep
pub(crate) fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        retry: ActivityPolicies {
            status_write: quick_retry(3),
            update_cluster_version: quick_retry(3),
            wait_update: quick_retry(3),
            update_addon: quick_retry(3),
            save_cluster_version: quick_retry(3),
            introspection: quick_retry(3),
            update_stack: quick_retry(3),
            wait_stack: quick_retry(3),
        },
        ..Default::default()
    }
}

/// One write observed by [`RecordingStore`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoreWrite {
    Cluster(ClusterStatus, String),
    Version(String),
    NodePool(String, NodePoolStatus, String),
}

/// Cluster store that keeps every write in order
#[derive(Debug, Default)]
pub(crate) struct RecordingStore {
    writes: Mutex<Vec<StoreWrite>>,
}

impl RecordingStore {
    pub(crate) fn writes(&self) -> Vec<StoreWrite> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn cluster_statuses(&self) -> Vec<ClusterStatus> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                StoreWrite::Cluster(status, _) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn last_cluster_status(&self) -> Option<(ClusterStatus, String)> {
        self.writes().into_iter().rev().find_map(|w| match w {
            StoreWrite::Cluster(status, message) => Some((status, message)),
            _ => None,
        })
    }

    pub(crate) fn node_pool_statuses(&self, node_pool: &str) -> Vec<NodePoolStatus> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                StoreWrite::NodePool(name, status, _) if name == node_pool => Some(status),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn versions(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| match w {
                StoreWrite::Version(v) => Some(v),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ClusterStore for RecordingStore {
    async fn set_cluster_status(
        &self,
        _cluster_id: u64,
        status: ClusterStatus,
        message: &str,
    ) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(StoreWrite::Cluster(status, message.to_string()));
        Ok(())
    }

    async fn set_cluster_version(&self, _cluster_id: u64, version: &str) -> Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(StoreWrite::Version(version.to_string()));
        Ok(())
    }

    async fn set_node_pool_status(
        &self,
        _cluster_id: u64,
        node_pool: &str,
        status: NodePoolStatus,
        message: &str,
    ) -> Result<()> {
        self.writes.lock().unwrap().push(StoreWrite::NodePool(
            node_pool.to_string(),
            status,
            message.to_string(),
        ));
        Ok(())
    }
}

/// Builds a [`Context`] from mocks; unset collaborators reject every call
pub(crate) struct TestContext {
    clusters: MockClusterApi,
    stacks: MockStackApi,
    images: MockImageApi,
    store: Arc<dyn ClusterStore>,
    config: OrchestratorConfig,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        Self {
            clusters: MockClusterApi::new(),
            stacks: MockStackApi::new(),
            images: MockImageApi::new(),
            store: Arc::new(RecordingStore::default()),
            config: fast_config(),
        }
    }

    pub(crate) fn clusters(mut self, clusters: MockClusterApi) -> Self {
        self.clusters = clusters;
        self
    }

    pub(crate) fn stacks(mut self, stacks: MockStackApi) -> Self {
        self.stacks = stacks;
        self
    }

    pub(crate) fn images(mut self, images: MockImageApi) -> Self {
        self.images = images;
        self
    }

    pub(crate) fn store(mut self, store: Arc<dyn ClusterStore>) -> Self {
        self.store = store;
        self
    }

    pub(crate) fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn build(self) -> Context {
        Context::builder(
            Arc::new(self.clusters),
            Arc::new(self.stacks),
            Arc::new(self.images),
            self.store,
        )
        .config(self.config)
        .build()
    }
}
