// ABOUTME: Availability-zone rollout ordering between node pools.
// ABOUTME: Pools in zone k wait for every zone-ordered pool in zone k-1; other pools are unordered.

use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::{NodePoolConfig, RollingStrategy};
use crate::types::StackName;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RolloutError {
    #[error("node pool {pool} uses the AvailabilityZone rolling strategy but has no subnets")]
    NoSubnets { pool: StackName },

    #[error("node pool {pool} has a subnet with no availability zone")]
    EmptyZone { pool: StackName },

    #[error(
        "node pool {pool} uses the AvailabilityZone rolling strategy, so all of its subnets must share one availability zone (found: {zones})"
    )]
    MixedZones { pool: StackName, zones: String },
}

fn is_zone_ordered(pool: &NodePoolConfig) -> bool {
    pool.rolling_strategy == RollingStrategy::AvailabilityZone
}

/// The single availability zone of a zone-ordered pool.
fn pool_zone(pool: &NodePoolConfig) -> Result<&str, RolloutError> {
    let Some(first) = pool.subnets.first() else {
        return Err(RolloutError::NoSubnets {
            pool: pool.name.clone(),
        });
    };

    let zone = first.availability_zone.as_str();
    if pool.subnets.iter().any(|s| s.availability_zone.is_empty()) {
        return Err(RolloutError::EmptyZone {
            pool: pool.name.clone(),
        });
    }
    if pool.subnets.iter().any(|s| s.availability_zone != zone) {
        return Err(RolloutError::MixedZones {
            pool: pool.name.clone(),
            zones: pool.availability_zones().join(", "),
        });
    }
    Ok(zone)
}

/// Availability zones of zone-ordered pools, in first-seen declaration order.
pub fn az_order(pools: &[NodePoolConfig]) -> Result<Vec<String>, RolloutError> {
    let mut order: Vec<String> = Vec::new();
    for pool in pools.iter().filter(|p| is_zone_ordered(p)) {
        let zone = pool_zone(pool)?;
        if !order.iter().any(|z| z == zone) {
            order.push(zone.to_string());
        }
    }
    Ok(order)
}

/// Pools that must reach a terminal success before `pool` is created or updated.
///
/// `order` is the output of [`az_order`] over the same `pools`.
pub fn dependencies(
    pool: &NodePoolConfig,
    order: &[String],
    pools: &[NodePoolConfig],
) -> Vec<StackName> {
    if !is_zone_ordered(pool) {
        return Vec::new();
    }
    let Some(zone) = pool.subnets.first().map(|s| s.availability_zone.as_str()) else {
        return Vec::new();
    };
    let Some(position) = order.iter().position(|z| z == zone) else {
        return Vec::new();
    };
    if position == 0 {
        return Vec::new();
    }

    let previous = order[position - 1].as_str();
    pools
        .iter()
        .filter(|other| other.name != pool.name && is_zone_ordered(other))
        .filter(|other| {
            other
                .subnets
                .first()
                .is_some_and(|s| s.availability_zone == previous)
        })
        .map(|other| other.name.clone())
        .collect()
}

/// Dependencies for every pool, keyed by pool name.
pub fn dependency_map(
    pools: &[NodePoolConfig],
) -> Result<BTreeMap<StackName, Vec<StackName>>, RolloutError> {
    let order = az_order(pools)?;
    Ok(pools
        .iter()
        .map(|pool| (pool.name.clone(), dependencies(pool, &order, pools)))
        .collect())
}
