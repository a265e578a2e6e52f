//! Common types for Keel: data model, errors, retry and telemetry

#![deny(missing_docs)]

pub mod error;
pub mod model;
pub mod retry;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Tag key carrying the node pool version fingerprint on its stack
pub const NODE_POOL_VERSION_TAG: &str = "keel.io/node-pool-version";

/// Tag key identifying the owning cluster on provider resources
pub const CLUSTER_TAG: &str = "keel.io/cluster";
