// ABOUTME: Worker node pool settings, their inheritance from cluster-wide values and invariants.
// ABOUTME: Covers auto-scaling bounds, spot fleets, cluster-autoscaler and the rolling strategy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{ConfigError, Result};
use super::iam::IamConfig;
use super::keys;
use super::merge::Merge;
use super::subnet::{Subnet, SubnetSpec};
use super::volume::{RootVolume, RootVolumeSpec};
use crate::types::StackName;

pub const DEFAULT_COUNT: i32 = 1;
pub const DEFAULT_TENANCY: &str = "default";
pub const TENANCIES: [&str; 2] = ["default", "dedicated"];
const DEFAULT_SPOT_FLEET_PRICE: &str = "0.06";
const DEFAULT_WEIGHTED_CAPACITY: i32 = 1;

/// Order in which node pools are created and updated relative to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollingStrategy {
    /// No ordering between pools.
    #[default]
    Parallel,
    /// Pools roll one availability zone at a time, in declaration order of the zones.
    AvailabilityZone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoScalingGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update_min_instances_in_service: Option<i32>,
}

impl AutoScalingGroup {
    pub const KEYS: &'static [&'static str] =
        &["minSize", "maxSize", "rollingUpdateMinInstancesInService"];

    pub fn validate(&self, path: &str) -> Result<()> {
        let non_negative = [
            ("minSize", self.min_size),
            ("maxSize", self.max_size),
            (
                "rollingUpdateMinInstancesInService",
                self.rolling_update_min_instances_in_service,
            ),
        ];
        for (key, value) in non_negative {
            if let Some(v) = value
                && v < 0
            {
                return Err(ConfigError::invalid(
                    keys::join(path, key),
                    format!("{key} must be zero or greater, got {v}"),
                ));
            }
        }

        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(ConfigError::invalid(
                keys::join(path, "minSize"),
                format!("minSize ({min}) must be less than or equal to maxSize ({max})"),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpecificationSpec {
    pub weighted_capacity: Option<i32>,
    pub instance_type: Option<String>,
    pub spot_price: Option<String>,
    pub root_volume: Option<RootVolumeSpec>,
}

impl LaunchSpecificationSpec {
    pub const KEYS: &'static [&'static str] =
        &["weightedCapacity", "instanceType", "spotPrice", "rootVolume"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchSpecification {
    pub weighted_capacity: i32,
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_price: Option<String>,
    pub root_volume: RootVolume,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotFleetSpec {
    pub target_capacity: Option<i32>,
    pub spot_price: Option<String>,
    pub iam_fleet_role_arn: Option<String>,
    #[serde(default)]
    pub launch_specifications: Vec<LaunchSpecificationSpec>,
}

impl SpotFleetSpec {
    pub const KEYS: &'static [&'static str] = &[
        "targetCapacity",
        "spotPrice",
        "iamFleetRoleArn",
        "launchSpecifications",
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotFleet {
    pub target_capacity: i32,
    pub spot_price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_fleet_role_arn: Option<String>,
    pub launch_specifications: Vec<LaunchSpecification>,
}

impl SpotFleet {
    pub fn enabled(&self) -> bool {
        self.target_capacity > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAutoscaler {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i32>,
}

impl ClusterAutoscaler {
    pub const KEYS: &'static [&'static str] = &["enabled", "minSize", "maxSize"];

    fn validate(&self, path: &str) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && (min < 0 || min > max)
        {
            return Err(ConfigError::invalid(
                keys::join(path, "minSize"),
                format!("minSize ({min}) must be between 0 and maxSize ({max})"),
            ));
        }
        Ok(())
    }
}

/// Fields a node pool inherits from the cluster when it leaves them unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerDefaults {
    pub key_name: Option<String>,
    pub release_channel: Option<String>,
    pub ami_id: Option<String>,
    pub kms_key_arn: Option<String>,
    pub tenancy: Option<String>,
    pub instance_type: Option<String>,
    pub root_volume: RootVolumeSpec,
    pub iam: Option<IamConfig>,
}

impl Merge for WorkerDefaults {
    fn merge(&mut self, defaults: &Self) {
        self.key_name.merge(&defaults.key_name);
        self.release_channel.merge(&defaults.release_channel);
        self.ami_id.merge(&defaults.ami_id);
        self.kms_key_arn.merge(&defaults.kms_key_arn);
        self.tenancy.merge(&defaults.tenancy);
        self.instance_type.merge(&defaults.instance_type);
        self.root_volume.merge(&defaults.root_volume);
        self.iam.merge(&defaults.iam);
    }
}

/// A node pool entry as written under `worker.nodePools`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    pub name: Option<String>,
    pub count: Option<i32>,
    pub instance_type: Option<String>,
    pub root_volume: Option<RootVolumeSpec>,
    pub subnets: Option<Vec<SubnetSpec>>,
    pub key_name: Option<String>,
    pub release_channel: Option<String>,
    pub ami_id: Option<String>,
    pub kms_key_arn: Option<String>,
    pub tenancy: Option<String>,
    pub spot_price: Option<String>,
    #[serde(default)]
    pub rolling_strategy: RollingStrategy,
    #[serde(default)]
    pub auto_scaling_group: AutoScalingGroup,
    #[serde(default)]
    pub spot_fleet: SpotFleetSpec,
    #[serde(default)]
    pub cluster_autoscaler: ClusterAutoscaler,
    #[serde(default)]
    pub node_labels: BTreeMap<String, String>,
    pub iam: Option<IamConfig>,
}

impl NodePoolSpec {
    pub const KEYS: &'static [&'static str] = &[
        "name",
        "count",
        "instanceType",
        "rootVolume",
        "subnets",
        "keyName",
        "releaseChannel",
        "amiId",
        "kmsKeyArn",
        "tenancy",
        "spotPrice",
        "rollingStrategy",
        "autoScalingGroup",
        "spotFleet",
        "clusterAutoscaler",
        "nodeLabels",
        "iam",
    ];

    /// Unknown-key check for one pool and its nested blocks.
    pub fn validate_keys(node: &serde_yaml::Value, path: &str) -> Result<()> {
        keys::ensure_known(node, path, Self::KEYS)?;
        keys::ensure_child_known(node, path, "rootVolume", RootVolumeSpec::KEYS)?;
        keys::ensure_each_known(node, path, "subnets", SubnetSpec::KEYS)?;
        keys::ensure_child_known(node, path, "autoScalingGroup", AutoScalingGroup::KEYS)?;
        keys::ensure_child_known(node, path, "clusterAutoscaler", ClusterAutoscaler::KEYS)?;
        if let Some(iam) = keys::child(node, "iam") {
            IamConfig::validate_keys(iam, &keys::join(path, "iam"))?;
        }
        if let Some(fleet) = keys::child(node, "spotFleet") {
            let fleet_path = keys::join(path, "spotFleet");
            keys::ensure_known(fleet, &fleet_path, SpotFleetSpec::KEYS)?;
            keys::ensure_each_known(
                fleet,
                &fleet_path,
                "launchSpecifications",
                LaunchSpecificationSpec::KEYS,
            )?;
            for (i, spec) in keys::sequence(fleet, "launchSpecifications").iter().enumerate() {
                let spec_path = keys::index(&keys::join(&fleet_path, "launchSpecifications"), i);
                keys::ensure_child_known(spec, &spec_path, "rootVolume", RootVolumeSpec::KEYS)?;
            }
        }
        Ok(())
    }

    /// The pool's own values for the inheritable fields.
    fn own_defaults(&self) -> WorkerDefaults {
        WorkerDefaults {
            key_name: self.key_name.clone(),
            release_channel: self.release_channel.clone(),
            ami_id: self.ami_id.clone(),
            kms_key_arn: self.kms_key_arn.clone(),
            tenancy: self.tenancy.clone(),
            instance_type: self.instance_type.clone(),
            root_volume: self.root_volume.clone().unwrap_or_default(),
            iam: self.iam.clone(),
        }
    }

    /// Resolve this pool: pool value, then cluster value, then built-in default.
    pub fn compile(
        &self,
        path: &str,
        cluster_name: &StackName,
        region: &str,
        inherited: &WorkerDefaults,
        cluster_subnets: &[Subnet],
    ) -> Result<NodePoolConfig> {
        let name = self
            .name
            .as_deref()
            .ok_or_else(|| ConfigError::invalid(keys::join(path, "name"), "name must be set"))
            .and_then(|n| {
                StackName::new(n)
                    .map_err(|e| ConfigError::invalid(keys::join(path, "name"), e.to_string()))
            })?;

        if self.count.is_some_and(|c| c != DEFAULT_COUNT)
            && (self.auto_scaling_group.min_size.is_some()
                || self.auto_scaling_group.max_size.is_some())
        {
            return Err(ConfigError::invalid(
                path,
                "count and autoScalingGroup.minSize/maxSize are mutually exclusive",
            ));
        }

        let mut merged = self.own_defaults();
        merged.merge(inherited);

        let instance_type = merged
            .instance_type
            .clone()
            .ok_or_else(|| {
                ConfigError::invalid(keys::join(path, "instanceType"), "instanceType must be set")
            })?;
        let root_volume = merged.root_volume.resolve();

        let subnets = match &self.subnets {
            Some(entries) => resolve_pool_subnets(
                path,
                &name,
                cluster_name.as_str(),
                entries,
                cluster_subnets,
            )?,
            None => cluster_subnets.to_vec(),
        };

        let spot_fleet = self.compile_spot_fleet(&instance_type, &merged.root_volume);

        let pool = NodePoolConfig {
            name,
            cluster_name: cluster_name.clone(),
            region: region.to_string(),
            count: self.count.unwrap_or(DEFAULT_COUNT),
            instance_type,
            root_volume,
            subnets,
            key_name: merged.key_name,
            release_channel: merged.release_channel.unwrap_or_default(),
            ami_id: merged.ami_id,
            kms_key_arn: merged.kms_key_arn,
            tenancy: merged
                .tenancy
                .unwrap_or_else(|| DEFAULT_TENANCY.to_string()),
            spot_price: self.spot_price.clone().filter(|p| !p.is_empty()),
            rolling_strategy: self.rolling_strategy,
            auto_scaling_group: self.auto_scaling_group.clone(),
            spot_fleet,
            cluster_autoscaler: self.cluster_autoscaler.clone(),
            node_labels: self.node_labels.clone(),
            iam: merged.iam.unwrap_or_default(),
        };

        pool.validate(path)?;
        Ok(pool)
    }

    fn compile_spot_fleet(&self, instance_type: &str, root_volume: &RootVolumeSpec) -> SpotFleet {
        let fleet = &self.spot_fleet;
        let target_capacity = fleet.target_capacity.unwrap_or(0);

        let mut launch_specifications: Vec<LaunchSpecification> = fleet
            .launch_specifications
            .iter()
            .map(|spec| {
                let volume = spec.root_volume.clone().unwrap_or_default();
                LaunchSpecification {
                    weighted_capacity: spec
                        .weighted_capacity
                        .unwrap_or(DEFAULT_WEIGHTED_CAPACITY),
                    instance_type: spec
                        .instance_type
                        .clone()
                        .unwrap_or_else(|| instance_type.to_string()),
                    spot_price: spec.spot_price.clone(),
                    root_volume: super::merge::merge(volume, root_volume).resolve(),
                }
            })
            .collect();

        if target_capacity > 0 && launch_specifications.is_empty() {
            launch_specifications.push(LaunchSpecification {
                weighted_capacity: DEFAULT_WEIGHTED_CAPACITY,
                instance_type: instance_type.to_string(),
                spot_price: None,
                root_volume: root_volume.resolve(),
            });
        }

        SpotFleet {
            target_capacity,
            spot_price: fleet
                .spot_price
                .clone()
                .unwrap_or_else(|| DEFAULT_SPOT_FLEET_PRICE.to_string()),
            iam_fleet_role_arn: fleet.iam_fleet_role_arn.clone(),
            launch_specifications,
        }
    }
}

fn resolve_pool_subnets(
    path: &str,
    pool: &StackName,
    cluster_name: &str,
    entries: &[SubnetSpec],
    cluster_subnets: &[Subnet],
) -> Result<Vec<Subnet>> {
    let subnets_path = keys::join(path, "subnets");
    entries
        .iter()
        .enumerate()
        .map(|(j, entry)| {
            let entry_path = keys::index(&subnets_path, j);
            if entry.is_reference() {
                let name = entry.name.as_deref().unwrap_or_default();
                cluster_subnets
                    .iter()
                    .find(|s| s.name == name)
                    .cloned()
                    .ok_or_else(|| {
                        ConfigError::invalid(
                            entry_path,
                            format!("no cluster subnet named \"{name}\""),
                        )
                    })
            } else {
                entry.resolve(
                    &entry_path,
                    format!("{}Subnet{j}", pool.logical_id()),
                    cluster_name,
                )
            }
        })
        .collect()
}

/// Fully resolved configuration of one worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolConfig {
    pub name: StackName,
    pub cluster_name: StackName,
    pub region: String,
    pub count: i32,
    pub instance_type: String,
    pub root_volume: RootVolume,
    pub subnets: Vec<Subnet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    pub release_channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
    pub tenancy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spot_price: Option<String>,
    pub rolling_strategy: RollingStrategy,
    pub auto_scaling_group: AutoScalingGroup,
    pub spot_fleet: SpotFleet,
    pub cluster_autoscaler: ClusterAutoscaler,
    pub node_labels: BTreeMap<String, String>,
    pub iam: IamConfig,
}

impl NodePoolConfig {
    pub fn min_count(&self) -> i32 {
        self.auto_scaling_group.min_size.unwrap_or(self.count)
    }

    pub fn max_count(&self) -> i32 {
        self.auto_scaling_group
            .max_size
            .unwrap_or_else(|| self.min_count())
    }

    pub fn rolling_update_min_instances_in_service(&self) -> i32 {
        self.auto_scaling_group
            .rolling_update_min_instances_in_service
            .unwrap_or_else(|| (self.max_count() - 1).max(0))
    }

    /// Availability zones of this pool's subnets, in subnet order, deduplicated.
    pub fn availability_zones(&self) -> Vec<&str> {
        let mut zones: Vec<&str> = Vec::new();
        for subnet in &self.subnets {
            if !zones.contains(&subnet.availability_zone.as_str()) {
                zones.push(&subnet.availability_zone);
            }
        }
        zones
    }

    fn validate(&self, path: &str) -> Result<()> {
        let asg_path = keys::join(path, "autoScalingGroup");

        if self.count < 0 {
            return Err(ConfigError::invalid(
                keys::join(path, "count"),
                format!("count must be zero or greater, got {}", self.count),
            ));
        }

        self.auto_scaling_group.validate(&asg_path)?;

        if self.min_count() > self.max_count() {
            return Err(ConfigError::invalid(
                keys::join(&asg_path, "maxSize"),
                format!(
                    "maxSize ({}) must be greater than or equal to the minimum count ({})",
                    self.max_count(),
                    self.min_count()
                ),
            ));
        }

        if self.max_count() > 0
            && self.rolling_update_min_instances_in_service() >= self.max_count()
        {
            return Err(ConfigError::invalid(
                keys::join(&asg_path, "rollingUpdateMinInstancesInService"),
                format!(
                    "rollingUpdateMinInstancesInService ({}) must be less than maxSize ({})",
                    self.rolling_update_min_instances_in_service(),
                    self.max_count()
                ),
            ));
        }

        if !TENANCIES.contains(&self.tenancy.as_str()) {
            return Err(ConfigError::invalid(
                keys::join(path, "tenancy"),
                format!(
                    "unsupported tenancy \"{}\" (expected one of: {})",
                    self.tenancy,
                    TENANCIES.join(", ")
                ),
            ));
        }

        self.root_volume.validate(&keys::join(path, "rootVolume"))?;
        self.iam.validate(&keys::join(path, "iam"))?;
        self.cluster_autoscaler
            .validate(&keys::join(path, "clusterAutoscaler"))?;
        self.validate_spot_fleet(&keys::join(path, "spotFleet"))?;

        if self.subnets.is_empty() {
            return Err(ConfigError::invalid(
                keys::join(path, "subnets"),
                "node pool must have at least one subnet",
            ));
        }

        Ok(())
    }

    fn validate_spot_fleet(&self, path: &str) -> Result<()> {
        let fleet = &self.spot_fleet;

        if fleet.target_capacity < 0 {
            return Err(ConfigError::invalid(
                keys::join(path, "targetCapacity"),
                "targetCapacity must be zero or greater",
            ));
        }

        if !fleet.enabled() {
            return Ok(());
        }

        if self.tenancy != DEFAULT_TENANCY {
            return Err(ConfigError::invalid(
                path,
                format!(
                    "selected tenancy ({}) is incompatible with spot fleet",
                    self.tenancy
                ),
            ));
        }

        if self.spot_price.is_some() {
            return Err(ConfigError::invalid(
                path,
                "spotPrice is incompatible with spot fleet; use spotFleet.spotPrice instead",
            ));
        }

        let specs_path = keys::join(path, "launchSpecifications");
        for (i, spec) in fleet.launch_specifications.iter().enumerate() {
            let spec_path = keys::index(&specs_path, i);
            if spec.weighted_capacity < 1 {
                return Err(ConfigError::invalid(
                    keys::join(&spec_path, "weightedCapacity"),
                    "weightedCapacity must be at least 1",
                ));
            }
            spec.root_volume
                .validate(&keys::join(&spec_path, "rootVolume"))?;
        }

        Ok(())
    }
}
