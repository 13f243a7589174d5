// ABOUTME: Orchestrator error types with SNAFU context selectors.
// ABOUTME: Every remote failure carries the stack it happened on; kind() classifies for exit codes.

use snafu::Snafu;
use std::path::PathBuf;
use std::time::Duration;

use super::services::ServiceError;
use crate::assets::AssetId;
use crate::config::ConfigError;
use crate::render::RenderError;
use crate::types::{StackName, TargetsError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProvisionError {
    #[snafu(display("{source}"))]
    Config { source: ConfigError },

    #[snafu(display("{source}"))]
    Render { source: RenderError },

    #[snafu(display("{source}"))]
    Targets { source: TargetsError },

    #[snafu(display("s3URI must be set to stage assets for {operation}"))]
    MissingS3Uri { operation: &'static str },

    #[snafu(display(
        "stacks {} have never been deployed; include them in the targets",
        stacks.iter().map(StackName::as_str).collect::<Vec<_>>().join(", ")
    ))]
    NotDeployed { stacks: Vec<StackName> },

    #[snafu(display("failed to stage {asset}: {source}"))]
    Stage {
        stack: StackName,
        asset: AssetId,
        source: ServiceError,
    },

    #[snafu(display("stack {stack}: {operation} failed: {source}"))]
    Remote {
        stack: String,
        operation: &'static str,
        source: ServiceError,
    },

    #[snafu(display("stack {stack}: deployed template is not valid JSON: {source}"))]
    DeployedTemplate {
        stack: String,
        source: serde_json::Error,
    },

    #[snafu(display("stack {stack} ended in {status}{}", format_events(events)))]
    StackFailed {
        stack: String,
        status: String,
        events: Vec<String>,
    },

    #[snafu(display("stack {stack}: gave up polling after {attempts} transient failures: {source}"))]
    PollExhausted {
        stack: String,
        attempts: u32,
        source: ServiceError,
    },

    #[snafu(display("stack {stack}: still in progress after {}s", waited.as_secs()))]
    Timeout { stack: String, waited: Duration },

    #[snafu(display("{}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn format_events(events: &[String]) -> String {
    events.iter().map(|e| format!("\n  {e}")).collect()
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionErrorKind {
    /// Bad input; fix the configuration or targets.
    Config,
    /// A template, userdata part or plugin contribution failed to render.
    Render,
    /// Remote service unreachable or rejecting calls.
    Remote,
    /// The stack service reported a failed operation.
    StackFailed,
    /// Local filesystem failure.
    Io,
    /// Internal invariant broken.
    Invariant,
}

impl ProvisionError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ProvisionErrorKind {
        match self {
            ProvisionError::Config { .. }
            | ProvisionError::Targets { .. }
            | ProvisionError::MissingS3Uri { .. }
            | ProvisionError::NotDeployed { .. } => ProvisionErrorKind::Config,
            ProvisionError::Render { source } => match source {
                RenderError::Asset(_) | RenderError::DuplicateLogicalId { .. } => {
                    ProvisionErrorKind::Invariant
                }
                _ => ProvisionErrorKind::Render,
            },
            ProvisionError::Stage { .. }
            | ProvisionError::Remote { .. }
            | ProvisionError::DeployedTemplate { .. }
            | ProvisionError::PollExhausted { .. }
            | ProvisionError::Timeout { .. } => ProvisionErrorKind::Remote,
            ProvisionError::StackFailed { .. } => ProvisionErrorKind::StackFailed,
            ProvisionError::Io { .. } => ProvisionErrorKind::Io,
        }
    }

    /// Reduced event log of a failed stack operation.
    pub fn failure_events(&self) -> Option<&[String]> {
        match self {
            ProvisionError::StackFailed { events, .. } => Some(events),
            _ => None,
        }
    }
}

impl From<ConfigError> for ProvisionError {
    fn from(source: ConfigError) -> Self {
        ProvisionError::Config { source }
    }
}

impl From<RenderError> for ProvisionError {
    fn from(source: RenderError) -> Self {
        ProvisionError::Render { source }
    }
}

impl From<TargetsError> for ProvisionError {
    fn from(source: TargetsError) -> Self {
        ProvisionError::Targets { source }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::AssetError;

    #[test]
    fn kinds_map_from_variants() {
        let err = ProvisionError::from(ConfigError::invalid("region", "missing"));
        assert_eq!(err.kind(), ProvisionErrorKind::Config);

        let dup = AssetId::new(StackName::etcd(), "stack.json");
        let err = ProvisionError::from(RenderError::Asset(AssetError::Duplicate(dup)));
        assert_eq!(err.kind(), ProvisionErrorKind::Invariant);

        let err = ProvisionError::Timeout {
            stack: "prod".into(),
            waited: Duration::from_secs(60),
        };
        assert_eq!(err.kind(), ProvisionErrorKind::Remote);
        assert!(err.to_string().ends_with("after 60s"));
    }

    #[test]
    fn stack_failure_lists_events() {
        let err = ProvisionError::StackFailed {
            stack: "prod".into(),
            status: "ROLLBACK_COMPLETE".into(),
            events: vec!["CREATE_FAILED AWS::EC2::Instance [Etcd0] quota".into()],
        };
        assert_eq!(
            err.to_string(),
            "stack prod ended in ROLLBACK_COMPLETE\n  CREATE_FAILED AWS::EC2::Instance [Etcd0] quota"
        );
        assert_eq!(err.failure_events().map(<[String]>::len), Some(1));
        assert_eq!(err.kind(), ProvisionErrorKind::StackFailed);
    }
}
