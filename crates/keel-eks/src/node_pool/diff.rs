//! Node pool differ
//!
//! Partitions the union of current and requested pools into deleted, created
//! and updated sets. Pure: the caller decides what to do with each set.

use std::collections::{BTreeMap, BTreeSet};

use keel_common::model::{NodePool, NodePoolModel, NodePoolSpec, ON_DEMAND_SPOT_PRICE};
use keel_common::{Error, Result};

/// Result of diffing current against requested node pools
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePoolDiff {
    /// Current pools absent from the request
    pub deleted: Vec<NodePoolModel>,
    /// Requested pools absent from the current state
    pub created: Vec<NodePool>,
    /// Requested pools that already exist; updated in place
    pub updated: Vec<NodePool>,
}

impl NodePoolDiff {
    /// Whether nothing changes
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }
}

/// Compute the node pool changes needed to reach `requested`
///
/// New pools must name an instance type and an image. Every invalid pool is
/// reported, combined into one error. An empty spot price on a new pool
/// becomes [`ON_DEMAND_SPOT_PRICE`].
pub fn diff_node_pools(
    current: &[NodePoolModel],
    requested: &BTreeMap<String, NodePoolSpec>,
) -> Result<NodePoolDiff> {
    let existing: BTreeSet<&str> = current.iter().map(|p| p.name.as_str()).collect();

    let deleted = current
        .iter()
        .filter(|p| !requested.contains_key(&p.name))
        .cloned()
        .collect();

    let mut created = Vec::new();
    let mut updated = Vec::new();
    let mut errors = Vec::new();

    for (name, spec) in requested {
        if existing.contains(name.as_str()) {
            updated.push(NodePool {
                name: name.clone(),
                spec: spec.clone(),
            });
            continue;
        }

        let missing: Vec<&str> = [
            ("instanceType", spec.instance_type.is_empty()),
            ("image", spec.image.is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();
        if !missing.is_empty() {
            errors.extend(missing.into_iter().map(|field| {
                Error::validation_for_field(
                    name,
                    field,
                    format!("required field {field} is missing for node pool {name}"),
                )
            }));
            continue;
        }

        let mut spec = spec.clone();
        if spec.spot_price.is_empty() {
            spec.spot_price = ON_DEMAND_SPOT_PRICE.to_string();
        }
        created.push(NodePool {
            name: name.clone(),
            spec,
        });
    }

    Error::combine(errors)?;
    Ok(NodePoolDiff {
        deleted,
        created,
        updated,
    })
}
