// ABOUTME: Root/EBS volume settings and their type/IOPS invariants.
// ABOUTME: io1 volumes need 100..=2000 provisioned IOPS; every other type must leave IOPS at zero.

use serde::{Deserialize, Serialize};

use super::error::{ConfigError, Result};
use super::keys;
use super::merge::Merge;

pub const VOLUME_TYPES: [&str; 3] = ["standard", "gp2", "io1"];
pub const PROVISIONED_IOPS_TYPE: &str = "io1";
pub const MIN_PROVISIONED_IOPS: u32 = 100;
pub const MAX_PROVISIONED_IOPS: u32 = 2000;

const DEFAULT_VOLUME_TYPE: &str = "gp2";
const DEFAULT_VOLUME_SIZE: u32 = 30;

/// Volume settings as written by the user; unset fields inherit from the wider scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootVolumeSpec {
    #[serde(rename = "type")]
    pub volume_type: Option<String>,
    pub size: Option<u32>,
    pub iops: Option<u32>,
}

impl RootVolumeSpec {
    pub const KEYS: &'static [&'static str] = &["type", "size", "iops"];

    pub fn resolve(&self) -> RootVolume {
        RootVolume {
            volume_type: self
                .volume_type
                .clone()
                .unwrap_or_else(|| DEFAULT_VOLUME_TYPE.to_string()),
            size: self.size.unwrap_or(DEFAULT_VOLUME_SIZE),
            iops: self.iops.unwrap_or(0),
        }
    }

    pub fn validate_keys(node: &serde_yaml::Value, path: &str) -> Result<()> {
        keys::ensure_known(node, path, Self::KEYS)
    }
}

impl Merge for RootVolumeSpec {
    fn merge(&mut self, defaults: &Self) {
        self.volume_type.merge(&defaults.volume_type);
        self.size.merge(&defaults.size);
        self.iops.merge(&defaults.iops);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootVolume {
    #[serde(rename = "type")]
    pub volume_type: String,
    pub size: u32,
    pub iops: u32,
}

impl Default for RootVolume {
    fn default() -> Self {
        RootVolumeSpec::default().resolve()
    }
}

impl RootVolume {
    pub fn validate(&self, path: &str) -> Result<()> {
        if !VOLUME_TYPES.contains(&self.volume_type.as_str()) {
            return Err(ConfigError::invalid(
                keys::join(path, "type"),
                format!(
                    "unsupported volume type \"{}\" (expected one of: {})",
                    self.volume_type,
                    VOLUME_TYPES.join(", ")
                ),
            ));
        }

        if self.volume_type == PROVISIONED_IOPS_TYPE {
            if !(MIN_PROVISIONED_IOPS..=MAX_PROVISIONED_IOPS).contains(&self.iops) {
                return Err(ConfigError::invalid(
                    keys::join(path, "iops"),
                    format!(
                        "volume type {PROVISIONED_IOPS_TYPE} requires iops between {MIN_PROVISIONED_IOPS} and {MAX_PROVISIONED_IOPS}, got {}",
                        self.iops
                    ),
                ));
            }
        } else if self.iops != 0 {
            return Err(ConfigError::invalid(
                keys::join(path, "iops"),
                format!(
                    "iops can only be set for volume type {PROVISIONED_IOPS_TYPE}, not \"{}\"",
                    self.volume_type
                ),
            ));
        }

        if self.size == 0 {
            return Err(ConfigError::invalid(
                keys::join(path, "size"),
                "volume size must be at least 1 GiB",
            ));
        }

        Ok(())
    }
}
