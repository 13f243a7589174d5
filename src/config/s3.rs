// ABOUTME: Parsed s3://bucket/prefix location where rendered assets are staged.
// ABOUTME: Serializes back to its URI form.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const SCHEME: &str = "s3://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    bucket: String,
    prefix: String,
}

impl S3Uri {
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix without leading or trailing slashes; may be empty.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Join key segments under the prefix.
    pub fn key(&self, rest: &str) -> String {
        if self.prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{}", self.prefix, rest)
        }
    }
}

impl FromStr for S3Uri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| format!("\"{s}\" must start with {SCHEME}"))?;
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(format!("\"{s}\" has no bucket name"));
        }
        Ok(S3Uri {
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
        })
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            write!(f, "{SCHEME}{}", self.bucket)
        } else {
            write!(f, "{SCHEME}{}/{}", self.bucket, self.prefix)
        }
    }
}

impl Serialize for S3Uri {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
