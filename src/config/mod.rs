// ABOUTME: Cluster configuration: cluster.yaml parsing, layered defaults and validation.
// ABOUTME: `compile` turns a raw ClusterSpec into a Config plus per-pool NodePoolConfigs.

mod cluster;
mod compile;
mod dns;
mod error;
mod iam;
pub mod keys;
pub mod merge;
mod node_pool;
mod plugins;
mod polling;
mod s3;
mod subnet;
mod volume;

pub use cluster::{
    CONFIG_FILENAME, CONFIG_FILENAME_ALT, CONFIG_FILENAME_DIR, ClusterSpec, ControllerSpec,
    EtcdSpec, WorkerSpec,
};
pub use compile::{CompiledCluster, Config, ControllerConfig, EtcdConfig, Vpc, compile};
pub use dns::{DnsSettings, is_subdomain};
pub use error::{ConfigError, Result};
pub use iam::{ArnRef, IamConfig, IamRole};
pub use node_pool::{
    AutoScalingGroup, ClusterAutoscaler, LaunchSpecification, NodePoolConfig, NodePoolSpec,
    RollingStrategy, SpotFleet,
};
pub use plugins::PluginConfig;
pub use polling::StackPolling;
pub use s3::S3Uri;
pub use subnet::{Cidr, Subnet, SubnetSpec};
pub use volume::{RootVolume, RootVolumeSpec};
