// ABOUTME: API endpoint DNS settings and the hosted-zone subdomain check.
// ABOUTME: Record-set management needs a hosted zone; when disabled, DNS fields must stay at defaults.

use serde::Serialize;

use super::error::{ConfigError, Result};

pub const DEFAULT_RECORD_SET_TTL: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsSettings {
    pub external_dns_name: String,
    pub create_record_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,
    #[serde(rename = "recordSetTTL")]
    pub record_set_ttl: i64,
}

impl DnsSettings {
    pub fn validate(&self) -> Result<()> {
        if self.external_dns_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "externalDNSName",
                "externalDNSName must be set",
            ));
        }

        let hosted_zone = self
            .hosted_zone_id
            .as_deref()
            .filter(|id| !id.is_empty());

        if self.create_record_set {
            if hosted_zone.is_none() {
                return Err(ConfigError::invalid(
                    "hostedZoneId",
                    "hostedZoneId must be specified when createRecordSet is true",
                ));
            }
            if self.record_set_ttl < 1 {
                return Err(ConfigError::invalid(
                    "recordSetTTL",
                    "TTL must be at least 1 second",
                ));
            }
        } else {
            if self.record_set_ttl != DEFAULT_RECORD_SET_TTL {
                return Err(ConfigError::invalid(
                    "recordSetTTL",
                    "recordSetTTL should not be modified when createRecordSet is false",
                ));
            }
            if hosted_zone.is_some() {
                return Err(ConfigError::invalid(
                    "hostedZoneId",
                    "hostedZoneId should not be set when createRecordSet is false",
                ));
            }
        }

        Ok(())
    }

    /// Check the external DNS name against the domain of the configured hosted zone.
    pub fn validate_zone_domain(&self, zone_domain: &str) -> Result<()> {
        if is_subdomain(&self.external_dns_name, zone_domain) {
            Ok(())
        } else {
            Err(ConfigError::invalid(
                "externalDNSName",
                format!(
                    "{} is not a subdomain of the hosted zone domain {}",
                    self.external_dns_name, zone_domain
                ),
            ))
        }
    }
}

/// Whether `sub` lies within `parent`, compared label by label.
///
/// Trailing dots are ignored, so fully qualified names compare equal to their
/// relative form. A name is a subdomain of itself.
pub fn is_subdomain(sub: &str, parent: &str) -> bool {
    let sub_labels: Vec<&str> = sub.trim_end_matches('.').split('.').collect();
    let parent_labels: Vec<&str> = parent.trim_end_matches('.').split('.').collect();

    if parent_labels.len() > sub_labels.len() {
        return false;
    }

    let offset = sub_labels.len() - parent_labels.len();
    sub_labels[offset..]
        .iter()
        .zip(&parent_labels)
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
}
