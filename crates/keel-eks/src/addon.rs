//! Managed addon version selection

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::warn;

use keel_common::{Error, Result};

/// One published version of a managed addon
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonVersion {
    /// Addon version string (e.g., "v1.8.3-eksbuild.1")
    pub version: String,
    /// Kubernetes versions this addon version supports (e.g., "1.29")
    #[serde(default)]
    pub compatible_cluster_versions: Vec<String>,
}

impl AddonVersion {
    /// Build a version entry
    pub fn new(version: impl Into<String>, compatible: &[&str]) -> Self {
        Self {
            version: version.into(),
            compatible_cluster_versions: compatible.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Whether this version lists `cluster_version` as compatible (exact match)
    pub fn supports(&self, cluster_version: &str) -> bool {
        self.compatible_cluster_versions
            .iter()
            .any(|v| v == cluster_version)
    }
}

fn parse_version(raw: &str) -> std::result::Result<Version, semver::Error> {
    let trimmed = raw.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
}

/// Pick the newest addon version compatible with `cluster_version`
///
/// Returns the highest of `current` and every compatible candidate, as the
/// original string. When no compatible candidate is newer, `current` comes
/// back unchanged and callers treat that as nothing to do. Candidates that
/// are not valid semantic versions are skipped.
pub fn select_latest_version(
    available: &[AddonVersion],
    current: &str,
    cluster_version: &str,
) -> Result<String> {
    let mut best = parse_version(current).map_err(|e| {
        Error::validation_for_field(
            current,
            "addonVersion",
            format!("current addon version {current} is not a semantic version: {e}"),
        )
    })?;
    let mut selected = current;

    for candidate in available.iter().filter(|c| c.supports(cluster_version)) {
        match parse_version(&candidate.version) {
            Ok(version) if version > best => {
                best = version;
                selected = candidate.version.as_str();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(version = %candidate.version, error = %e, "skipping unparseable addon version");
            }
        }
    }

    Ok(selected.to_string())
}
