//! Default node image selection
//!
//! Node pools that don't name an image launch the default image for the
//! cluster's Kubernetes version and region. The selector is built once from
//! configuration and handed to whatever needs it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use keel_common::{Error, Result};

/// Instance families that need the GPU/accelerator image
const ACCELERATED_FAMILIES: &[&str] = &[
    "p2", "p3", "p3dn", "p4d", "p5", "g3", "g4dn", "g5", "inf1", "inf2",
];

/// Whether an instance type needs the accelerated image
pub fn is_accelerated_instance(instance_type: &str) -> bool {
    instance_type
        .split_once('.')
        .map(|(family, _)| ACCELERATED_FAMILIES.contains(&family))
        .unwrap_or(false)
}

/// Image IDs keyed by Kubernetes version, then region
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageTable {
    /// Standard node images
    pub default: BTreeMap<String, BTreeMap<String, String>>,
    /// Images for accelerated instance types
    pub accelerated: BTreeMap<String, BTreeMap<String, String>>,
}

impl ImageTable {
    /// Image for a Kubernetes version and region
    pub fn lookup(&self, kubernetes_version: &str, region: &str, accelerated: bool) -> Option<&str> {
        let table = if accelerated {
            &self.accelerated
        } else {
            &self.default
        };
        table
            .get(kubernetes_version)
            .and_then(|regions| regions.get(region))
            .map(String::as_str)
    }
}

/// Chooses the image for node pools that don't specify one
#[cfg_attr(test, automock)]
pub trait ImageSelector: Send + Sync {
    /// Default image for `instance_type` nodes on `kubernetes_version` in `region`
    fn select_image(
        &self,
        kubernetes_version: &str,
        region: &str,
        instance_type: &str,
    ) -> Result<String>;
}

/// Selector backed by a fixed [`ImageTable`]
#[derive(Clone, Debug, Default)]
pub struct StaticImageSelector {
    table: ImageTable,
}

impl StaticImageSelector {
    /// Build a selector from a table
    pub fn new(table: ImageTable) -> Self {
        Self { table }
    }
}

impl ImageSelector for StaticImageSelector {
    fn select_image(
        &self,
        kubernetes_version: &str,
        region: &str,
        instance_type: &str,
    ) -> Result<String> {
        let accelerated = is_accelerated_instance(instance_type);
        self.table
            .lookup(kubernetes_version, region, accelerated)
            .map(str::to_string)
            .ok_or_else(|| {
                let kind = if accelerated {
                    "accelerated image"
                } else {
                    "image"
                };
                Error::not_found(kind, format!("kubernetes {kubernetes_version} in {region}"))
            })
    }
}
