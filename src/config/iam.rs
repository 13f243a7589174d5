// ABOUTME: IAM instance profile and managed policy settings.
// ABOUTME: ARNs are checked against the fixed AWS instance-profile and managed-policy patterns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::error::{ConfigError, Result};
use super::keys;
use super::merge::Atomic;

static MANAGED_POLICY_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws(-cn|-us-gov)?:iam::(aws|[0-9]{12}):policy/[\w+=,.@/-]+$")
        .expect("managed policy pattern is valid")
});

static INSTANCE_PROFILE_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:aws(-cn|-us-gov)?:iam::[0-9]{12}:instance-profile/[\w+=,.@/-]+$")
        .expect("instance profile pattern is valid")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_profile: Option<ArnRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<IamRole>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArnRef {
    pub arn: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamRole {
    #[serde(default)]
    pub managed_policies: Vec<ArnRef>,
}

impl Atomic for IamConfig {}

impl IamConfig {
    pub const KEYS: &'static [&'static str] = &["instanceProfile", "role"];
    const ARN_KEYS: &'static [&'static str] = &["arn"];
    const ROLE_KEYS: &'static [&'static str] = &["managedPolicies"];

    pub fn validate_keys(node: &serde_yaml::Value, path: &str) -> Result<()> {
        keys::ensure_known(node, path, Self::KEYS)?;
        keys::ensure_child_known(node, path, "instanceProfile", Self::ARN_KEYS)?;
        if let Some(role) = keys::child(node, "role") {
            let role_path = keys::join(path, "role");
            keys::ensure_known(role, &role_path, Self::ROLE_KEYS)?;
            keys::ensure_each_known(role, &role_path, "managedPolicies", Self::ARN_KEYS)?;
        }
        Ok(())
    }

    pub fn validate(&self, path: &str) -> Result<()> {
        if let Some(profile) = &self.instance_profile
            && !INSTANCE_PROFILE_ARN.is_match(&profile.arn)
        {
            return Err(ConfigError::invalid(
                keys::join(path, "instanceProfile.arn"),
                format!("invalid instance profile ARN: {}", profile.arn),
            ));
        }

        if let Some(role) = &self.role {
            for (i, policy) in role.managed_policies.iter().enumerate() {
                if !MANAGED_POLICY_ARN.is_match(&policy.arn) {
                    return Err(ConfigError::invalid(
                        format!("{}.arn", keys::index(&keys::join(path, "role.managedPolicies"), i)),
                        format!("invalid managed policy ARN: {}", policy.arn),
                    ));
                }
            }
        }

        Ok(())
    }
}
