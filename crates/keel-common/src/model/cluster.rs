//! Cluster status as observed by the rest of the platform

use serde::{Deserialize, Serialize};

/// Cluster lifecycle status
///
/// A single mutable value per cluster. Failing pipeline steps set `Warning`
/// or `Error`, and every successful pipeline completion sets `Running`.
/// Writes are unconditional overwrites: the last writer wins.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterStatus {
    /// Cluster infrastructure is being created
    #[default]
    Creating,
    /// A version or node pool update is in progress
    Updating,
    /// Cluster infrastructure is being deleted
    Deleting,
    /// Cluster is operational
    Running,
    /// Cluster is operational but the last operation failed
    Warning,
    /// Cluster is unusable
    Error,
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::Updating => write!(f, "UPDATING"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// Human readable messages written alongside status transitions
pub mod messages {
    /// Cluster is healthy
    pub const RUNNING: &str = "Cluster is running";
    /// Version update started
    pub const UPDATING_VERSION: &str = "Updating cluster version";
    /// Node pool update started
    pub const UPDATING_NODE_POOL: &str = "Updating node pool";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ClusterStatus::Warning).unwrap(),
            "\"WARNING\""
        );
        assert_eq!(ClusterStatus::Running.to_string(), "RUNNING");
    }
}
