// ABOUTME: Raw cluster spec as authored in cluster.yaml, with structural defaults applied.
// ABOUTME: Keeps the parsed YAML tree alongside the typed form for unknown-key checks.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::dns::DEFAULT_RECORD_SET_TTL;
use super::error::{ConfigError, Result};
use super::iam::IamConfig;
use super::keys;
use super::node_pool::NodePoolSpec;
use super::plugins::PluginConfig;
use super::polling::StackPolling;
use super::subnet::SubnetSpec;
use super::volume::RootVolumeSpec;

pub const CONFIG_FILENAME: &str = "cluster.yaml";
pub const CONFIG_FILENAME_ALT: &str = "cluster.yml";
pub const CONFIG_FILENAME_DIR: &str = ".strata/cluster.yaml";

pub const DEFAULT_CLUSTER_NAME: &str = "kubernetes";
pub const DEFAULT_RELEASE_CHANNEL: &str = "stable";
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.medium";
pub const DEFAULT_INSTANCE_CIDR: &str = "10.0.0.0/24";
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    #[serde(default = "default_release_channel")]
    pub release_channel: String,
    pub ami_id: Option<String>,
    #[serde(default)]
    pub region: String,
    pub key_name: Option<String>,

    #[serde(rename = "externalDNSName", default)]
    pub external_dns_name: String,
    #[serde(default)]
    pub create_record_set: bool,
    pub hosted_zone_id: Option<String>,
    #[serde(rename = "recordSetTTL", default = "default_record_set_ttl")]
    pub record_set_ttl: i64,

    pub availability_zone: Option<String>,
    #[serde(rename = "instanceCIDR", default = "default_instance_cidr")]
    pub instance_cidr: String,
    pub vpc_id: Option<String>,
    #[serde(rename = "vpcCIDR", default = "default_vpc_cidr")]
    pub vpc_cidr: String,
    pub internet_gateway_id: Option<String>,
    pub route_table_id: Option<String>,
    #[serde(default)]
    pub subnets: Vec<SubnetSpec>,

    pub kms_key_arn: Option<String>,
    pub tenancy: Option<String>,
    #[serde(default = "default_instance_type")]
    pub worker_instance_type: String,
    #[serde(default)]
    pub worker_root_volume: RootVolumeSpec,

    #[serde(default)]
    pub controller: ControllerSpec,
    #[serde(default)]
    pub etcd: EtcdSpec,
    #[serde(default)]
    pub worker: WorkerSpec,
    pub iam: Option<IamConfig>,

    #[serde(rename = "s3URI")]
    pub s3_uri: Option<String>,
    #[serde(default)]
    pub stack_tags: BTreeMap<String, String>,
    pub stack_policy: Option<String>,
    #[serde(default)]
    pub stack_polling: StackPolling,

    #[serde(default)]
    pub plugins: BTreeMap<String, PluginConfig>,

    #[serde(skip)]
    raw: serde_yaml::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerSpec {
    #[serde(default = "default_count")]
    pub count: i32,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default)]
    pub root_volume: RootVolumeSpec,
    pub iam: Option<IamConfig>,
}

impl ControllerSpec {
    pub const KEYS: &'static [&'static str] = &["count", "instanceType", "rootVolume", "iam"];
}

impl Default for ControllerSpec {
    fn default() -> Self {
        Self {
            count: default_count(),
            instance_type: default_instance_type(),
            root_volume: RootVolumeSpec::default(),
            iam: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    #[serde(default = "default_count")]
    pub count: i32,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default)]
    pub root_volume: RootVolumeSpec,
}

impl EtcdSpec {
    pub const KEYS: &'static [&'static str] = &["count", "instanceType", "rootVolume"];
}

impl Default for EtcdSpec {
    fn default() -> Self {
        Self {
            count: default_count(),
            instance_type: default_instance_type(),
            root_volume: RootVolumeSpec::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSpec {
    #[serde(default)]
    pub node_pools: Vec<NodePoolSpec>,
}

impl WorkerSpec {
    pub const KEYS: &'static [&'static str] = &["nodePools"];
}

impl ClusterSpec {
    pub const KEYS: &'static [&'static str] = &[
        "clusterName",
        "releaseChannel",
        "amiId",
        "region",
        "keyName",
        "externalDNSName",
        "createRecordSet",
        "hostedZoneId",
        "recordSetTTL",
        "availabilityZone",
        "instanceCIDR",
        "vpcId",
        "vpcCIDR",
        "internetGatewayId",
        "routeTableId",
        "subnets",
        "kmsKeyArn",
        "tenancy",
        "workerInstanceType",
        "workerRootVolume",
        "controller",
        "etcd",
        "worker",
        "iam",
        "s3URI",
        "stackTags",
        "stackPolicy",
        "stackPolling",
        "plugins",
    ];

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        if raw.is_null() {
            raw = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());
        }
        let mut spec: ClusterSpec = serde_yaml::from_value(raw.clone())?;
        spec.raw = raw;
        Ok(spec)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(ConfigError::NotFound(dir.to_path_buf()))
    }

    /// Whether `key` was written explicitly at the top level.
    pub fn is_set(&self, key: &str) -> bool {
        keys::child(&self.raw, key).is_some()
    }

    /// Walk the parsed tree and reject any key outside the declared allow-lists.
    pub fn validate_keys(&self) -> Result<()> {
        let raw = &self.raw;
        keys::ensure_known(raw, "", Self::KEYS)?;
        keys::ensure_each_known(raw, "", "subnets", SubnetSpec::KEYS)?;
        keys::ensure_child_known(raw, "", "workerRootVolume", RootVolumeSpec::KEYS)?;
        keys::ensure_child_known(raw, "", "stackPolling", StackPolling::KEYS)?;

        if let Some(iam) = keys::child(raw, "iam") {
            IamConfig::validate_keys(iam, "iam")?;
        }

        if let Some(controller) = keys::child(raw, "controller") {
            keys::ensure_known(controller, "controller", ControllerSpec::KEYS)?;
            keys::ensure_child_known(controller, "controller", "rootVolume", RootVolumeSpec::KEYS)?;
            if let Some(iam) = keys::child(controller, "iam") {
                IamConfig::validate_keys(iam, "controller.iam")?;
            }
        }

        if let Some(etcd) = keys::child(raw, "etcd") {
            keys::ensure_known(etcd, "etcd", EtcdSpec::KEYS)?;
            keys::ensure_child_known(etcd, "etcd", "rootVolume", RootVolumeSpec::KEYS)?;
        }

        if let Some(worker) = keys::child(raw, "worker") {
            keys::ensure_known(worker, "worker", WorkerSpec::KEYS)?;
            for (i, pool) in keys::sequence(worker, "nodePools").iter().enumerate() {
                NodePoolSpec::validate_keys(pool, &keys::index("worker.nodePools", i))?;
            }
        }

        if let Some(serde_yaml::Value::Mapping(plugins)) = keys::child(raw, "plugins") {
            for (name, plugin) in plugins {
                let name = name.as_str().unwrap_or_default();
                keys::ensure_known(plugin, &keys::join("plugins", name), PluginConfig::KEYS)?;
            }
        }

        Ok(())
    }
}

fn default_cluster_name() -> String {
    DEFAULT_CLUSTER_NAME.to_string()
}

fn default_release_channel() -> String {
    DEFAULT_RELEASE_CHANNEL.to_string()
}

fn default_record_set_ttl() -> i64 {
    DEFAULT_RECORD_SET_TTL
}

fn default_instance_cidr() -> String {
    DEFAULT_INSTANCE_CIDR.to_string()
}

fn default_vpc_cidr() -> String {
    DEFAULT_VPC_CIDR.to_string()
}

fn default_instance_type() -> String {
    DEFAULT_INSTANCE_TYPE.to_string()
}

fn default_count() -> i32 {
    1
}
