// ABOUTME: Content-addressed assets (templates, userdata) addressed by stack and file name.
// ABOUTME: Computes staging keys and URLs and rejects duplicate ids across stacks.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{Config, S3Uri};
use crate::types::StackName;

/// Length of the digest prefix placed in staged keys.
const DIGEST_PREFIX_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssetError {
    /// Two renders produced the same (stack, file); a rendering bug, not user input.
    #[error("duplicate asset {0}")]
    Duplicate(AssetId),

    #[error("asset {0} was never rendered")]
    Missing(AssetId),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AssetId {
    pub stack: StackName,
    pub file: String,
}

impl AssetId {
    pub fn new(stack: StackName, file: impl Into<String>) -> Self {
        Self {
            stack,
            file: file.into(),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack, self.file)
    }
}

/// Where an asset lives once staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetLocation {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: AssetId,
    pub content: String,
    /// Carries credentials or other material that should be encrypted at rest.
    pub secret: bool,
    pub location: AssetLocation,
}

/// Hex SHA-256 of `content`.
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Computes staged keys and URLs for a cluster's assets.
#[derive(Debug, Clone)]
pub struct AssetLocator {
    cluster: StackName,
    region: String,
    domain: &'static str,
    s3: Option<S3Uri>,
}

impl AssetLocator {
    pub fn new(config: &Config) -> Self {
        Self {
            cluster: config.cluster_name.clone(),
            region: config.region.clone(),
            domain: config.aws_domain(),
            s3: config.s3_uri.clone(),
        }
    }

    pub fn s3(&self) -> Option<&S3Uri> {
        self.s3.as_ref()
    }

    /// `<prefix>/<cluster>/stacks/<stack>/<digest>-<file>`; the URL is the bare key when no bucket is configured.
    pub fn locate(&self, id: &AssetId, content: &str) -> AssetLocation {
        let digest = content_digest(content);
        let relative = format!(
            "{}/stacks/{}/{}-{}",
            self.cluster,
            id.stack,
            &digest[..DIGEST_PREFIX_LEN],
            id.file
        );
        match &self.s3 {
            Some(s3) => {
                let key = s3.key(&relative);
                let url = format!(
                    "https://s3.{}.{}/{}/{}",
                    self.region,
                    self.domain,
                    s3.bucket(),
                    key
                );
                AssetLocation { key, url }
            }
            None => AssetLocation {
                key: relative.clone(),
                url: relative,
            },
        }
    }

    pub fn asset(&self, id: AssetId, content: String, secret: bool) -> Asset {
        let location = self.locate(&id, &content);
        Asset {
            id,
            content,
            secret,
            location,
        }
    }
}

/// Every asset of a run, addressable by id.
#[derive(Debug, Clone, Default)]
pub struct Assets {
    items: BTreeMap<AssetId, Asset>,
}

impl Assets {
    pub fn add(&mut self, asset: Asset) -> Result<(), AssetError> {
        if self.items.contains_key(&asset.id) {
            return Err(AssetError::Duplicate(asset.id));
        }
        self.items.insert(asset.id.clone(), asset);
        Ok(())
    }

    /// Move every asset of `other` into this collection.
    pub fn merge(&mut self, other: Assets) -> Result<(), AssetError> {
        for (_, asset) in other.items {
            self.add(asset)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &AssetId) -> Option<&Asset> {
        self.items.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.items.values()
    }

    pub fn for_stack<'a>(&'a self, stack: &'a StackName) -> impl Iterator<Item = &'a Asset> + 'a {
        self.items.values().filter(move |a| &a.id.stack == stack)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Local path mirroring an asset's stack/file address.
pub fn export_path(root: &Path, id: &AssetId) -> PathBuf {
    root.join(id.stack.as_str()).join(&id.file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterSpec, compile};

    fn config(extra: &str) -> Config {
        let yaml = format!(
            "region: us-west-1\nexternalDNSName: k8s.example.com\navailabilityZone: us-west-1a\nclusterName: prod\n{extra}"
        );
        compile(&ClusterSpec::from_yaml(&yaml).unwrap(), Vec::new())
            .unwrap()
            .config
    }

    fn id(stack: &str, file: &str) -> AssetId {
        AssetId::new(StackName::new(stack).unwrap(), file)
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            content_digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn staged_key_and_url() {
        let locator = AssetLocator::new(&config("s3URI: s3://bucket/team\n"));
        let location = locator.locate(&id("etcd", "stack.json"), "");
        assert_eq!(location.key, "team/prod/stacks/etcd/e3b0c44298fc-stack.json");
        assert_eq!(
            location.url,
            "https://s3.us-west-1.amazonaws.com/bucket/team/prod/stacks/etcd/e3b0c44298fc-stack.json"
        );
    }

    #[test]
    fn relative_location_without_bucket() {
        let locator = AssetLocator::new(&config(""));
        let location = locator.locate(&id("etcd", "stack.json"), "");
        assert_eq!(location.url, "prod/stacks/etcd/e3b0c44298fc-stack.json");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let locator = AssetLocator::new(&config(""));
        let mut assets = Assets::default();
        assets
            .add(locator.asset(id("etcd", "stack.json"), "a".into(), false))
            .unwrap();

        let mut other = Assets::default();
        other
            .add(locator.asset(id("etcd", "stack.json"), "b".into(), false))
            .unwrap();
        assert_eq!(
            assets.merge(other),
            Err(AssetError::Duplicate(id("etcd", "stack.json")))
        );
    }

    #[test]
    fn filters_by_stack() {
        let locator = AssetLocator::new(&config(""));
        let mut assets = Assets::default();
        for (stack, file) in [("etcd", "stack.json"), ("etcd", "userdata-etcd"), ("root", "stack.json")] {
            assets
                .add(locator.asset(id(stack, file), String::new(), false))
                .unwrap();
        }
        let etcd = StackName::new("etcd").unwrap();
        assert_eq!(assets.for_stack(&etcd).count(), 2);
        assert_eq!(
            export_path(Path::new("/out"), &id("root", "stack.json")),
            PathBuf::from("/out/root/stack.json")
        );
    }
}
