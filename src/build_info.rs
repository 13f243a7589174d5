// ABOUTME: Build metadata handed to the orchestrator at construction.
// ABOUTME: Stamped into generated templates so deployed stacks record the tool version.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl BuildInfo {
    pub fn new(version: impl Into<String>, commit: Option<String>) -> Self {
        Self {
            version: version.into(),
            commit,
        }
    }

    /// Metadata of this binary, captured at compile time.
    pub fn current() -> Self {
        Self::new(
            env!("CARGO_PKG_VERSION"),
            option_env!("STRATA_GIT_COMMIT").map(str::to_string),
        )
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.commit {
            Some(commit) => write!(f, "{} ({commit})", self.version),
            None => f.write_str(&self.version),
        }
    }
}
