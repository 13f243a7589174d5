// ABOUTME: Subnet topology: availability zone, CIDR and optional pre-existing identifiers.
// ABOUTME: Resolves node pool subnet references and checks CIDR containment in the VPC.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::error::{ConfigError, Result};
use super::keys;

/// Subnet entry as written by the user.
///
/// In a node pool, an entry with only `name` refers to a cluster-level subnet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetSpec {
    pub name: Option<String>,
    pub availability_zone: Option<String>,
    #[serde(rename = "instanceCIDR")]
    pub instance_cidr: Option<String>,
    pub id: Option<String>,
    pub route_table_id: Option<String>,
}

impl SubnetSpec {
    pub const KEYS: &'static [&'static str] = &[
        "name",
        "availabilityZone",
        "instanceCIDR",
        "id",
        "routeTableId",
    ];

    /// True for entries that only name a cluster subnet.
    pub fn is_reference(&self) -> bool {
        self.name.is_some()
            && self.availability_zone.is_none()
            && self.instance_cidr.is_none()
            && self.id.is_none()
            && self.route_table_id.is_none()
    }

    /// Resolve a full subnet declaration, naming it `default_name` if unnamed.
    pub fn resolve(&self, path: &str, default_name: String, cluster_name: &str) -> Result<Subnet> {
        let availability_zone = self
            .availability_zone
            .clone()
            .filter(|az| !az.is_empty())
            .ok_or_else(|| {
                ConfigError::invalid(
                    keys::join(path, "availabilityZone"),
                    "availabilityZone must be set",
                )
            })?;

        let instance_cidr = match &self.instance_cidr {
            Some(cidr) => Some(
                cidr.parse::<Cidr>()
                    .map_err(|e| ConfigError::invalid(keys::join(path, "instanceCIDR"), e))?,
            ),
            None => None,
        };

        if instance_cidr.is_none() && self.id.is_none() {
            return Err(ConfigError::invalid(
                path,
                "either instanceCIDR or an existing subnet id must be set",
            ));
        }

        let name = self.name.clone().unwrap_or(default_name);
        let import_name = self
            .id
            .is_none()
            .then(|| format!("{cluster_name}-{name}"));

        Ok(Subnet {
            name,
            availability_zone,
            instance_cidr,
            id: self.id.clone(),
            route_table_id: self.route_table_id.clone(),
            import_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub name: String,
    pub availability_zone: String,
    #[serde(rename = "instanceCIDR", skip_serializing_if = "Option::is_none")]
    pub instance_cidr: Option<Cidr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,
    /// Export name the network stack publishes for subnets it creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import_name: Option<String>,
}

impl Subnet {
    /// Whether the subnet is created by the network stack rather than pre-existing.
    pub fn is_managed(&self) -> bool {
        self.id.is_none()
    }
}

/// An IPv4 CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    fn network(&self) -> u32 {
        u32::from(self.addr) & self.mask()
    }

    /// Whether `other` lies entirely within this block.
    pub fn contains(&self, other: &Cidr) -> bool {
        other.prefix >= self.prefix && other.network() & self.mask() == self.network()
    }

    pub fn overlaps(&self, other: &Cidr) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR \"{s}\": missing prefix length"))?;
        let addr = addr
            .parse::<Ipv4Addr>()
            .map_err(|e| format!("invalid CIDR \"{s}\": {e}"))?;
        let prefix = prefix
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| format!("invalid CIDR \"{s}\": prefix must be 0-32"))?;
        Ok(Cidr { addr, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl Serialize for Cidr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Check that managed subnets fit in the VPC and do not overlap each other.
pub fn validate_topology(vpc_cidr: &Cidr, subnets: &[Subnet]) -> Result<()> {
    let mut names: Vec<&str> = Vec::new();
    let mut managed: Vec<(&str, &Cidr)> = Vec::new();

    for (i, subnet) in subnets.iter().enumerate() {
        let path = keys::index("subnets", i);

        if names.contains(&subnet.name.as_str()) {
            return Err(ConfigError::invalid(
                keys::join(&path, "name"),
                format!("duplicate subnet name \"{}\"", subnet.name),
            ));
        }
        names.push(&subnet.name);

        // Pre-existing subnets are not checked against the VPC block.
        let Some(cidr) = subnet.instance_cidr.as_ref().filter(|_| subnet.is_managed()) else {
            continue;
        };

        if !vpc_cidr.contains(cidr) {
            return Err(ConfigError::invalid(
                keys::join(&path, "instanceCIDR"),
                format!("{cidr} is not within vpcCIDR {vpc_cidr}"),
            ));
        }
        if let Some((other, _)) = managed.iter().find(|(_, c)| c.overlaps(cidr)) {
            return Err(ConfigError::invalid(
                keys::join(&path, "instanceCIDR"),
                format!("{cidr} overlaps with subnet \"{other}\""),
            ));
        }
        managed.push((&subnet.name, cidr));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> Cidr {
        s.parse().unwrap()
    }

    #[test]
    fn parses_and_displays() {
        assert_eq!(cidr("10.0.1.0/24").to_string(), "10.0.1.0/24");
        assert!("10.0.0.0".parse::<Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Cidr>().is_err());
        assert!("10.0.0/24".parse::<Cidr>().is_err());
    }

    #[test]
    fn containment_and_overlap() {
        let vpc = cidr("10.0.0.0/16");
        assert!(vpc.contains(&cidr("10.0.3.0/24")));
        assert!(!vpc.contains(&cidr("10.1.0.0/24")));
        assert!(cidr("10.0.0.0/24").overlaps(&cidr("10.0.0.128/25")));
        assert!(!cidr("10.0.0.0/24").overlaps(&cidr("10.0.1.0/24")));
    }

    #[test]
    fn reference_detection() {
        let reference = SubnetSpec {
            name: Some("public1".to_string()),
            ..Default::default()
        };
        assert!(reference.is_reference());

        let inline = SubnetSpec {
            name: Some("public1".to_string()),
            availability_zone: Some("us-west-1a".to_string()),
            ..Default::default()
        };
        assert!(!inline.is_reference());
    }

    #[test]
    fn managed_subnet_gets_import_name() {
        let spec = SubnetSpec {
            availability_zone: Some("us-west-1a".to_string()),
            instance_cidr: Some("10.0.0.0/24".to_string()),
            ..Default::default()
        };
        let subnet = spec.resolve("subnets[0]", "Subnet0".to_string(), "prod").unwrap();
        assert_eq!(subnet.import_name.as_deref(), Some("prod-Subnet0"));
        assert!(subnet.is_managed());
    }

    #[test]
    fn overlapping_subnets_rejected() {
        let make = |name: &str, c: &str| Subnet {
            name: name.to_string(),
            availability_zone: "us-west-1a".to_string(),
            instance_cidr: Some(cidr(c)),
            id: None,
            route_table_id: None,
            import_name: None,
        };
        let vpc = cidr("10.0.0.0/16");
        let err = validate_topology(&vpc, &[make("a", "10.0.0.0/24"), make("b", "10.0.0.0/25")])
            .unwrap_err();
        assert!(err.to_string().contains("overlaps"));
        assert!(validate_topology(&vpc, &[make("a", "10.0.0.0/24"), make("b", "10.0.1.0/24")]).is_ok());
    }
}
