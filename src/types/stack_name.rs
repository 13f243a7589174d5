// ABOUTME: DNS-compatible stack and node pool name validation.
// ABOUTME: Also maps stack names to the CamelCase logical ids used in templates.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StackNameError {
    #[error("stack name cannot be empty")]
    Empty,

    #[error("stack name exceeds maximum length of 63 characters")]
    TooLong,

    #[error("stack name must start with a letter")]
    StartsWithNonLetter,

    #[error("stack name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("invalid character in stack name: '{0}'")]
    InvalidChar(char),
}

/// Name of a stack (or node pool) in the cluster hierarchy.
///
/// Letters, digits and hyphens only, starting with a letter. Mixed case is
/// accepted because node pool names are also used as template logical ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackName(String);

impl StackName {
    pub fn new(value: &str) -> Result<Self, StackNameError> {
        if value.is_empty() {
            return Err(StackNameError::Empty);
        }

        if value.len() > 63 {
            return Err(StackNameError::TooLong);
        }

        if !value.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(StackNameError::StartsWithNonLetter);
        }

        if value.ends_with('-') {
            return Err(StackNameError::EndsWithHyphen);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-')
        {
            return Err(StackNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    /// Wrap a constant already known to satisfy the naming rules.
    pub(crate) fn trusted(value: &'static str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// CamelCase form used for nested stack resources, e.g. `control-plane` -> `ControlPlane`.
    pub fn logical_id(&self) -> String {
        self.0
            .split('-')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect()
    }
}

impl fmt::Display for StackName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for StackName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for StackName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StackName::new(&s).map_err(serde::de::Error::custom)
    }
}
