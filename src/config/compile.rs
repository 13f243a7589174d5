// ABOUTME: Compiles a raw cluster spec into a validated Config plus one NodePoolConfig per pool.
// ABOUTME: Applies derived defaults, unknown-key checks and cross-field invariants; never partially succeeds.

use serde::Serialize;
use std::collections::BTreeMap;

use super::cluster::ClusterSpec;
use super::dns::DnsSettings;
use super::error::{ConfigError, Result};
use super::iam::IamConfig;
use super::keys;
use super::node_pool::{NodePoolConfig, TENANCIES, WorkerDefaults};
use super::plugins::PluginConfig;
use super::polling::StackPolling;
use super::s3::S3Uri;
use super::subnet::{self, Cidr, Subnet, SubnetSpec};
use super::volume::RootVolume;
use crate::plugin::Plugin;
use crate::types::{RESERVED_STACK_NAMES, StackName};

pub const RELEASE_CHANNELS: [&str; 3] = ["alpha", "beta", "stable"];

/// Fully resolved cluster-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub cluster_name: StackName,
    pub release_channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ami_id: Option<String>,
    pub region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(flatten)]
    pub dns: DnsSettings,
    pub vpc: Vpc,
    pub subnets: Vec<Subnet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
    pub tenancy: String,
    pub controller: ControllerConfig,
    pub etcd: EtcdConfig,
    pub iam: IamConfig,
    #[serde(rename = "s3URI", skip_serializing_if = "Option::is_none")]
    pub s3_uri: Option<S3Uri>,
    pub stack_tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_policy: Option<String>,
    pub stack_polling: StackPolling,
    pub plugins: BTreeMap<String, PluginConfig>,
}

/// The VPC either created by the network stack or referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Vpc {
    pub cidr: Cidr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internet_gateway_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,
    /// Export name other stacks import when the VPC is managed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_name: Option<String>,
}

impl Vpc {
    pub fn is_managed(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    pub count: i32,
    pub instance_type: String,
    pub root_volume: RootVolume,
    pub iam: IamConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdConfig {
    pub count: i32,
    pub instance_type: String,
    pub root_volume: RootVolume,
}

/// Output of a successful compile.
#[derive(Debug, Clone)]
pub struct CompiledCluster {
    pub config: Config,
    pub node_pools: Vec<NodePoolConfig>,
    /// Every loaded plugin; enablement is decided by the merge engine.
    pub plugins: Vec<Plugin>,
}

impl CompiledCluster {
    pub fn node_pool(&self, name: &StackName) -> Option<&NodePoolConfig> {
        self.node_pools.iter().find(|p| &p.name == name)
    }
}

/// Compile `spec` and attach the loaded `plugins`.
pub fn compile(spec: &ClusterSpec, plugins: Vec<Plugin>) -> Result<CompiledCluster> {
    spec.validate_keys()?;

    let cluster_name = StackName::new(&spec.cluster_name)
        .map_err(|e| ConfigError::invalid("clusterName", e.to_string()))?;

    let subnets = cluster_subnets(spec, &cluster_name)?;
    let vpc = resolve_vpc(spec, &cluster_name)?;

    let config = Config {
        cluster_name,
        release_channel: spec.release_channel.clone(),
        ami_id: spec.ami_id.clone().filter(|s| !s.is_empty()),
        region: spec.region.clone(),
        key_name: spec.key_name.clone().filter(|s| !s.is_empty()),
        dns: DnsSettings {
            external_dns_name: spec.external_dns_name.clone(),
            create_record_set: spec.create_record_set,
            hosted_zone_id: spec.hosted_zone_id.clone(),
            record_set_ttl: spec.record_set_ttl,
        },
        vpc,
        subnets,
        kms_key_arn: spec.kms_key_arn.clone().filter(|s| !s.is_empty()),
        tenancy: spec
            .tenancy
            .clone()
            .unwrap_or_else(|| super::node_pool::DEFAULT_TENANCY.to_string()),
        controller: ControllerConfig {
            count: spec.controller.count,
            instance_type: spec.controller.instance_type.clone(),
            root_volume: spec.controller.root_volume.resolve(),
            iam: spec.controller.iam.clone().unwrap_or_default(),
        },
        etcd: EtcdConfig {
            count: spec.etcd.count,
            instance_type: spec.etcd.instance_type.clone(),
            root_volume: spec.etcd.root_volume.resolve(),
        },
        iam: spec.iam.clone().unwrap_or_default(),
        s3_uri: spec
            .s3_uri
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<S3Uri>().map_err(|e| ConfigError::invalid("s3URI", e)))
            .transpose()?,
        stack_tags: spec.stack_tags.clone(),
        stack_policy: spec.stack_policy.clone().filter(|s| !s.is_empty()),
        stack_polling: spec.stack_polling,
        plugins: spec.plugins.clone(),
    };

    config.validate()?;

    let inherited = worker_defaults(spec);
    let mut node_pools: Vec<NodePoolConfig> = Vec::with_capacity(spec.worker.node_pools.len());
    for (i, pool_spec) in spec.worker.node_pools.iter().enumerate() {
        let path = keys::index("worker.nodePools", i);
        let pool = pool_spec.compile(
            &path,
            &config.cluster_name,
            &config.region,
            &inherited,
            &config.subnets,
        )?;

        if RESERVED_STACK_NAMES.contains(&pool.name.as_str()) {
            return Err(ConfigError::invalid(
                keys::join(&path, "name"),
                format!("\"{}\" is reserved for a cluster stack", pool.name),
            ));
        }
        if node_pools.iter().any(|p| p.name == pool.name) {
            return Err(ConfigError::invalid(
                keys::join(&path, "name"),
                format!("duplicate node pool name \"{}\"", pool.name),
            ));
        }
        let logical_id = pool.name.logical_id();
        let clash = RESERVED_STACK_NAMES
            .iter()
            .map(|name| StackName::trusted(name))
            .chain(node_pools.iter().map(|p| p.name.clone()))
            .find(|other| other.logical_id() == logical_id);
        if let Some(other) = clash {
            return Err(ConfigError::invalid(
                keys::join(&path, "name"),
                format!(
                    "node pool \"{}\" has the same logical id {logical_id} as stack \"{other}\"",
                    pool.name
                ),
            ));
        }
        node_pools.push(pool);
    }

    crate::rollout::az_order(&node_pools)
        .map_err(|e| ConfigError::invalid("worker.nodePools", e.to_string()))?;

    tracing::debug!(
        cluster = %config.cluster_name,
        node_pools = node_pools.len(),
        plugins = plugins.len(),
        "compiled cluster spec"
    );

    Ok(CompiledCluster {
        config,
        node_pools,
        plugins,
    })
}

/// Cluster subnets, synthesizing one from `availabilityZone` + `instanceCIDR` when none are listed.
fn cluster_subnets(spec: &ClusterSpec, cluster_name: &StackName) -> Result<Vec<Subnet>> {
    if spec.subnets.is_empty() {
        let synthesized = SubnetSpec {
            availability_zone: spec.availability_zone.clone(),
            instance_cidr: Some(spec.instance_cidr.clone()),
            ..Default::default()
        };
        let subnet = synthesized
            .resolve("", "Subnet0".to_string(), cluster_name.as_str())
            .map_err(|e| match e {
                ConfigError::Invalid { message, .. } => {
                    ConfigError::invalid("availabilityZone", message)
                }
                other => other,
            })?;
        return Ok(vec![subnet]);
    }

    if spec.availability_zone.is_some() {
        return Err(ConfigError::invalid(
            "availabilityZone",
            "availabilityZone and subnets are mutually exclusive",
        ));
    }
    if spec.is_set("instanceCIDR") {
        return Err(ConfigError::invalid(
            "instanceCIDR",
            "instanceCIDR and subnets are mutually exclusive",
        ));
    }

    spec.subnets
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            entry.resolve(
                &keys::index("subnets", i),
                format!("Subnet{i}"),
                cluster_name.as_str(),
            )
        })
        .collect()
}

fn resolve_vpc(spec: &ClusterSpec, cluster_name: &StackName) -> Result<Vpc> {
    let cidr = spec
        .vpc_cidr
        .parse::<Cidr>()
        .map_err(|e| ConfigError::invalid("vpcCIDR", e))?;
    let id = spec.vpc_id.clone().filter(|s| !s.is_empty());

    if id.is_none() {
        if spec.route_table_id.is_some() {
            return Err(ConfigError::invalid(
                "routeTableId",
                "routeTableId requires vpcId to be set",
            ));
        }
        if spec.internet_gateway_id.is_some() {
            return Err(ConfigError::invalid(
                "internetGatewayId",
                "internetGatewayId requires vpcId to be set",
            ));
        }
    }

    let import_name = id.is_none().then(|| format!("{cluster_name}-VPC"));

    Ok(Vpc {
        cidr,
        id,
        internet_gateway_id: spec.internet_gateway_id.clone(),
        route_table_id: spec.route_table_id.clone(),
        import_name,
    })
}

/// Cluster-level values node pools inherit when they leave a field unset.
fn worker_defaults(spec: &ClusterSpec) -> WorkerDefaults {
    WorkerDefaults {
        key_name: spec.key_name.clone(),
        release_channel: Some(spec.release_channel.clone()),
        ami_id: spec.ami_id.clone(),
        kms_key_arn: spec.kms_key_arn.clone(),
        tenancy: spec.tenancy.clone(),
        instance_type: Some(spec.worker_instance_type.clone()),
        root_volume: spec.worker_root_volume.clone(),
        iam: spec.iam.clone(),
    }
}

impl Config {
    fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::invalid("region", "region must be set"));
        }
        if !RELEASE_CHANNELS.contains(&self.release_channel.as_str()) {
            return Err(ConfigError::invalid(
                "releaseChannel",
                format!(
                    "unsupported release channel \"{}\" (expected one of: {})",
                    self.release_channel,
                    RELEASE_CHANNELS.join(", ")
                ),
            ));
        }
        if !TENANCIES.contains(&self.tenancy.as_str()) {
            return Err(ConfigError::invalid(
                "tenancy",
                format!("unsupported tenancy \"{}\"", self.tenancy),
            ));
        }

        self.dns.validate()?;
        subnet::validate_topology(&self.vpc.cidr, &self.subnets)?;

        if self.controller.count < 1 {
            return Err(ConfigError::invalid(
                "controller.count",
                "at least one controller is required",
            ));
        }
        if self.etcd.count < 1 {
            return Err(ConfigError::invalid(
                "etcd.count",
                "at least one etcd node is required",
            ));
        }
        self.controller.root_volume.validate("controller.rootVolume")?;
        self.etcd.root_volume.validate("etcd.rootVolume")?;
        self.iam.validate("iam")?;
        self.controller.iam.validate("controller.iam")?;

        if let Some(policy) = &self.stack_policy
            && let Err(e) = serde_json::from_str::<serde_json::Value>(policy)
        {
            return Err(ConfigError::invalid(
                "stackPolicy",
                format!("stack policy is not valid JSON: {e}"),
            ));
        }

        self.stack_polling.validate()
    }

    /// Remote API endpoint domain suffix for the configured region.
    pub fn aws_domain(&self) -> &'static str {
        if self.region.starts_with("cn-") {
            "amazonaws.com.cn"
        } else {
            "amazonaws.com"
        }
    }
}
