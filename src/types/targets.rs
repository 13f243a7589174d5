// ABOUTME: Operation targets restricting which stacks a command touches.
// ABOUTME: Either the "all" sentinel or a non-empty set of known stack names.

use nonempty::NonEmpty;
use std::fmt;
use thiserror::Error;

use super::{StackName, StackNameError};

pub const ALL_TARGETS: &str = "all";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetsError {
    #[error("invalid target stack name '{name}': {source}")]
    InvalidName {
        name: String,
        source: StackNameError,
    },

    #[error("unknown target stack '{name}' (known stacks: {known})")]
    UnknownStack { name: String, known: String },

    #[error("\"{ALL_TARGETS}\" cannot be combined with other targets")]
    MixedWithAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OperationTargets {
    #[default]
    All,
    Stacks(NonEmpty<StackName>),
}

impl OperationTargets {
    /// Parse CLI-style target names. No names, or exactly `all`, means every stack.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, TargetsError> {
        let names: Vec<&str> = names
            .iter()
            .map(|n| n.as_ref().trim())
            .filter(|n| !n.is_empty())
            .collect();

        if names.is_empty() || names == [ALL_TARGETS] {
            return Ok(OperationTargets::All);
        }
        if names.contains(&ALL_TARGETS) {
            return Err(TargetsError::MixedWithAll);
        }

        let mut stacks: Vec<StackName> = Vec::with_capacity(names.len());
        for name in names {
            let stack = StackName::new(name).map_err(|source| TargetsError::InvalidName {
                name: name.to_string(),
                source,
            })?;
            if !stacks.contains(&stack) {
                stacks.push(stack);
            }
        }

        // names was non-empty, so stacks is too
        NonEmpty::from_vec(stacks)
            .map(OperationTargets::Stacks)
            .ok_or(TargetsError::MixedWithAll)
    }

    pub fn includes(&self, stack: &StackName) -> bool {
        match self {
            OperationTargets::All => true,
            OperationTargets::Stacks(stacks) => stacks.iter().any(|s| s == stack),
        }
    }

    /// Resolve against the known stacks, preserving the order of `known`.
    pub fn resolve(&self, known: &[StackName]) -> Result<Vec<StackName>, TargetsError> {
        if let OperationTargets::Stacks(stacks) = self
            && let Some(unknown) = stacks.iter().find(|s| !known.contains(s))
        {
            return Err(TargetsError::UnknownStack {
                name: unknown.to_string(),
                known: known
                    .iter()
                    .map(StackName::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        Ok(known
            .iter()
            .filter(|s| self.includes(s))
            .cloned()
            .collect())
    }
}

impl fmt::Display for OperationTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationTargets::All => f.write_str(ALL_TARGETS),
            OperationTargets::Stacks(stacks) => {
                let names: Vec<&str> = stacks.iter().map(StackName::as_str).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}
