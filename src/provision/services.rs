// ABOUTME: Remote capabilities the orchestrator drives: object store, stack service, hosted zones.
// ABOUTME: Implementations are supplied by the caller; errors classify as transient or terminal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a remote capability.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Network or throttling hiccup; the call may be retried.
    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("{0}")]
    Terminal(String),

    /// An update found nothing to change.
    #[error("no updates are to be performed")]
    NoUpdates,

    #[error("stack {0} does not exist")]
    NotFound(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Status string reported by the stack service, e.g. `CREATE_COMPLETE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StackStatus(String);

impl StackStatus {
    pub const CREATE_COMPLETE: &'static str = "CREATE_COMPLETE";
    pub const UPDATE_COMPLETE: &'static str = "UPDATE_COMPLETE";
    pub const DELETE_COMPLETE: &'static str = "DELETE_COMPLETE";

    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_in_progress(&self) -> bool {
        self.0.ends_with("_IN_PROGRESS")
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_in_progress()
    }

    /// Terminal and not a failure or rollback.
    pub fn is_success(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::CREATE_COMPLETE | Self::UPDATE_COMPLETE | Self::DELETE_COMPLETE
        )
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    pub status: StackStatus,
    pub reason: Option<String>,
}

/// One entry of a stack's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEvent {
    pub timestamp: DateTime<Utc>,
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub reason: Option<String>,
}

/// Arguments of a create or update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub name: String,
    pub template_url: String,
    pub tags: BTreeMap<String, String>,
    pub policy: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> ServiceResult<()>;
}

#[async_trait]
pub trait StackService: Send + Sync {
    /// Returns the new stack's id.
    async fn create_stack(&self, request: &StackRequest) -> ServiceResult<String>;

    /// Fails with [`ServiceError::NoUpdates`] when the stack already matches.
    async fn update_stack(&self, request: &StackRequest) -> ServiceResult<String>;

    async fn delete_stack(&self, name: &str) -> ServiceResult<()>;

    /// Fails with [`ServiceError::NotFound`] for unknown stacks.
    async fn describe_stack(&self, name: &str) -> ServiceResult<StackDescription>;

    async fn list_events(&self, name: &str) -> ServiceResult<Vec<StackEvent>>;

    /// Currently deployed template body.
    async fn get_template(&self, name: &str) -> ServiceResult<String>;

    /// Structural validation report for the template at `template_url`.
    async fn validate_template(&self, template_url: &str) -> ServiceResult<String>;

    /// URL of a cost estimate for the template at `template_url`.
    async fn estimate_cost(&self, template_url: &str) -> ServiceResult<String>;
}

#[async_trait]
pub trait HostedZones: Send + Sync {
    /// Domain name of the hosted zone `id`.
    async fn zone_domain(&self, id: &str) -> ServiceResult<String>;
}

/// The capabilities handed to a provisioner.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn ObjectStore>,
    pub stacks: Arc<dyn StackService>,
    pub zones: Option<Arc<dyn HostedZones>>,
}

impl Services {
    pub fn new(store: Arc<dyn ObjectStore>, stacks: Arc<dyn StackService>) -> Self {
        Self {
            store,
            stacks,
            zones: None,
        }
    }

    pub fn with_hosted_zones(mut self, zones: Arc<dyn HostedZones>) -> Self {
        self.zones = Some(zones);
        self
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("zones", &self.zones.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(StackStatus::new("CREATE_IN_PROGRESS").is_in_progress());
        assert!(StackStatus::new("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS").is_in_progress());
        assert!(StackStatus::new("UPDATE_COMPLETE").is_success());
        let rolled_back = StackStatus::new("ROLLBACK_COMPLETE");
        assert!(rolled_back.is_terminal());
        assert!(!rolled_back.is_success());
    }

    #[test]
    fn only_transient_errors_retry() {
        assert!(ServiceError::Transient("throttled".into()).is_transient());
        assert!(!ServiceError::Terminal("denied".into()).is_transient());
        assert!(!ServiceError::NotFound("x".into()).is_transient());
    }
}
