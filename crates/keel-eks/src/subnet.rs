//! Subnet resolution for node pools and network validation at cluster creation

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use keel_common::model::{ClusterNetwork, NodePoolSpec, Subnet};
use keel_common::{Error, Result};

use crate::cidr::Ipv4Cidr;

/// VPC CIDR used when a cluster creates its own VPC without specifying one
pub const DEFAULT_VPC_CIDR: &str = "192.168.0.0/16";

/// Map a node pool to the cluster subnet it launches into
///
/// A pool without a subnet reference gets the first cluster subnet. A pool
/// naming a subnet by ID or CIDR gets the first cluster subnet matching it.
/// Only IDs from `cluster_subnets` are ever returned.
pub fn resolve_subnet(
    pool_name: &str,
    pool: &NodePoolSpec,
    cluster_subnets: &[Subnet],
) -> Result<Vec<String>> {
    let matched = match &pool.subnet {
        None => cluster_subnets.first(),
        Some(wanted) if wanted.id().is_none() && wanted.cidr().is_none() => {
            cluster_subnets.first()
        }
        Some(wanted) => cluster_subnets.iter().find(|s| {
            (wanted.id().is_some() && s.id() == wanted.id())
                || (wanted.cidr().is_some() && s.cidr() == wanted.cidr())
        }),
    };

    let subnet_id = matched.and_then(Subnet::id).ok_or_else(|| {
        let wanted = pool
            .subnet
            .as_ref()
            .and_then(|s| s.id().or(s.cidr()))
            .unwrap_or("<default>");
        Error::validation_for_field(
            pool_name,
            "subnet",
            format!("no cluster subnet matches {wanted} for node pool {pool_name}"),
        )
    })?;

    debug!(node_pool = %pool_name, subnet = %subnet_id, "resolved node pool subnet");
    Ok(vec![subnet_id.to_string()])
}

/// Validate the network section of a cluster creation request
///
/// Runs before any cloud call. Every rule is checked and all violations are
/// returned together.
pub fn validate_cluster_network(cluster: &str, network: &ClusterNetwork) -> Result<()> {
    let mut errors = Vec::new();
    let vpc_id = network.vpc.vpc_id.as_deref().filter(|s| !s.is_empty());
    let vpc_cidr = network.vpc.cidr.as_deref().filter(|s| !s.is_empty());
    let route_table = network.route_table_id.as_deref().filter(|s| !s.is_empty());

    if vpc_id.is_some() && vpc_cidr.is_some() {
        errors.push(Error::validation_for_field(
            cluster,
            "vpc",
            "VPC ID and VPC CIDR cannot both be set",
        ));
    }

    let existing = network.subnets.iter().filter(|s| s.is_existing()).count();
    let new: Vec<&Subnet> = network.subnets.iter().filter(|s| s.is_new()).collect();
    if existing > 0 && !new.is_empty() {
        errors.push(Error::validation_for_field(
            cluster,
            "subnets",
            "existing subnets (by ID) and new subnets (by CIDR) cannot be mixed",
        ));
    }

    for subnet in network.subnets.iter().filter(|s| !s.is_existing() && !s.is_new()) {
        errors.push(Error::validation_for_field(
            cluster,
            "subnets",
            format!("subnet {subnet:?} has neither an ID nor a CIDR"),
        ));
    }

    // Same CIDR listed twice must mean the same subnet
    let mut zones: BTreeMap<&str, &str> = BTreeMap::new();
    for subnet in &new {
        let (Some(cidr), zone) = (subnet.cidr(), subnet.zone().unwrap_or_default()) else {
            continue;
        };
        match zones.get(cidr) {
            Some(seen) if *seen != zone => errors.push(Error::validation_for_field(
                cluster,
                "subnets",
                format!("subnet {cidr} is listed in availability zones {seen} and {zone}"),
            )),
            Some(_) => {}
            None => {
                zones.insert(cidr, zone);
            }
        }
    }

    if !new.is_empty() {
        match route_table {
            None if vpc_id.is_some() => errors.push(Error::validation_for_field(
                cluster,
                "routeTableId",
                "a route table ID is required to create subnets in an existing VPC",
            )),
            Some(_) if vpc_id.is_none() => errors.push(Error::validation_for_field(
                cluster,
                "routeTableId",
                "a route table ID may only be set when creating subnets in an existing VPC",
            )),
            _ => {}
        }
    } else if route_table.is_some() {
        errors.push(Error::validation_for_field(
            cluster,
            "routeTableId",
            "a route table ID may only be set when creating subnets in an existing VPC",
        ));
    }

    let known_vpc_cidr = match vpc_id {
        Some(_) => None,
        None => Some(vpc_cidr.unwrap_or(DEFAULT_VPC_CIDR)),
    };
    errors.extend(validate_subnet_cidrs(cluster, known_vpc_cidr, &zones));

    Error::combine(errors)
}

/// Containment and overlap checks for the distinct new subnet CIDRs
///
/// Containment is only checked when the VPC CIDR is known, which is the case
/// when the cluster creates its own VPC.
fn validate_subnet_cidrs(
    cluster: &str,
    vpc_cidr: Option<&str>,
    zones: &BTreeMap<&str, &str>,
) -> Vec<Error> {
    let mut errors = Vec::new();

    let vpc = match vpc_cidr.map(str::parse::<Ipv4Cidr>) {
        Some(Ok(vpc)) => Some(vpc),
        Some(Err(e)) => {
            errors.push(e);
            None
        }
        None => None,
    };

    let mut parsed: Vec<(&str, Ipv4Cidr)> = Vec::new();
    let mut seen = BTreeSet::new();
    for cidr in zones.keys() {
        match cidr.parse::<Ipv4Cidr>() {
            Ok(block) if seen.insert(block) => parsed.push((*cidr, block)),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
    }

    if let Some(vpc) = vpc {
        for (raw, block) in &parsed {
            if block.size() > vpc.size() || !vpc.contains(block) {
                errors.push(Error::validation_for_field(
                    cluster,
                    "subnets",
                    format!("subnet {raw} is not contained in VPC CIDR {vpc}"),
                ));
            }
        }
    }

    for (i, (a_raw, a)) in parsed.iter().enumerate() {
        for (b_raw, b) in &parsed[i + 1..] {
            if a.overlaps(b) {
                errors.push(Error::validation_for_field(
                    cluster,
                    "subnets",
                    format!("subnets {a_raw} and {b_raw} overlap"),
                ));
            }
        }
    }

    errors
}
