//! Orchestrator configuration
//!
//! Loaded once from YAML and passed to the pipelines. Every field has a
//! default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use keel_common::{Error, Result};
use keel_workflow::ActivityRetryPolicy;

use crate::image::ImageTable;

/// Default interval between status polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
/// Default number of polls before a wait gives up
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;
/// Default root volume size for node pools, in GiB
pub const DEFAULT_VOLUME_SIZE: u32 = 50;

/// Retry policies for every activity the pipelines run
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityPolicies {
    /// Cluster and node pool status writes
    pub status_write: ActivityRetryPolicy,
    /// Control plane version update submission
    pub update_cluster_version: ActivityRetryPolicy,
    /// Waiting for a version or addon update to finish
    pub wait_update: ActivityRetryPolicy,
    /// Addon version lookup and update submission
    pub update_addon: ActivityRetryPolicy,
    /// Persisting the new cluster version
    pub save_cluster_version: ActivityRetryPolicy,
    /// Reading current stack parameters and image sizes
    pub introspection: ActivityRetryPolicy,
    /// Node pool stack update submission
    pub update_stack: ActivityRetryPolicy,
    /// Waiting for a stack update to finish
    pub wait_stack: ActivityRetryPolicy,
}

impl ActivityPolicies {
    /// Every policy with the config key it is read from
    pub fn named(&self) -> [(&'static str, &ActivityRetryPolicy); 8] {
        [
            ("retry.statusWrite", &self.status_write),
            ("retry.updateClusterVersion", &self.update_cluster_version),
            ("retry.waitUpdate", &self.wait_update),
            ("retry.updateAddon", &self.update_addon),
            ("retry.saveClusterVersion", &self.save_cluster_version),
            ("retry.introspection", &self.introspection),
            ("retry.updateStack", &self.update_stack),
            ("retry.waitStack", &self.wait_stack),
        ]
    }
}

impl Default for ActivityPolicies {
    fn default() -> Self {
        // Waits resume from their heartbeat, so a few attempts cover worker
        // restarts without restarting the whole poll budget
        let wait = ActivityRetryPolicy {
            initial_interval_secs: 10,
            maximum_interval_secs: 60,
            maximum_attempts: 5,
            ..Default::default()
        };
        Self {
            status_write: ActivityRetryPolicy::default(),
            update_cluster_version: ActivityRetryPolicy::with_max_attempts(10),
            wait_update: wait.clone(),
            update_addon: ActivityRetryPolicy::with_max_attempts(10),
            save_cluster_version: ActivityRetryPolicy::default(),
            introspection: ActivityRetryPolicy::with_max_attempts(10),
            update_stack: ActivityRetryPolicy::with_max_attempts(10),
            wait_stack: wait,
        }
    }
}

/// Configuration for the update pipelines
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Seconds between status polls while waiting
    pub poll_interval_secs: u64,
    /// Polls before a wait fails with a timeout
    pub max_poll_attempts: u32,
    /// Root volume size for node pools that don't set one, in GiB
    pub default_volume_size: u32,
    /// Managed addons upgraded after a control plane version update
    pub managed_addons: Vec<String>,
    /// Per-activity retry policies
    pub retry: ActivityPolicies,
    /// Default node images by Kubernetes version and region
    pub images: ImageTable,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            default_volume_size: DEFAULT_VOLUME_SIZE,
            managed_addons: vec![
                "vpc-cni".to_string(),
                "coredns".to_string(),
                "kube-proxy".to_string(),
            ],
            retry: ActivityPolicies::default(),
            images: ImageTable::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a YAML configuration
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| {
            Error::serialization_for_kind("OrchestratorConfig", format!("invalid config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_with_context(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_yaml(&yaml)
    }

    /// Reject settings the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.poll_interval_secs == 0 {
            errors.push(Error::validation_for_field(
                "config",
                "pollIntervalSecs",
                "poll interval must be positive",
            ));
        }
        if self.max_poll_attempts == 0 {
            errors.push(Error::validation_for_field(
                "config",
                "maxPollAttempts",
                "max poll attempts must be positive",
            ));
        }
        if self.default_volume_size == 0 {
            errors.push(Error::validation_for_field(
                "config",
                "defaultVolumeSize",
                "default volume size must be positive",
            ));
        }
        for (field, policy) in self.retry.named() {
            errors.extend(policy.violations(field));
        }
        Error::combine(errors)
    }

    /// Interval between polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}
