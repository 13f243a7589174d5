// ABOUTME: Multi-stack provisioning: render, stage, then create, update or destroy the cluster.
// ABOUTME: The Provisioner wraps the type-state Run for each contract operation.

mod diff;
mod error;
mod events;
mod poll;
mod run;
mod services;
mod state;

pub use diff::{DiffReport, StackDiff};
pub use error::{ProvisionError, ProvisionErrorKind, Result};
pub use events::{CANCELLED_REASON, failure_lines};
pub use poll::{PollSettings, wait_for_terminal};
pub use run::{Run, destroy};
pub use services::{
    HostedZones, ObjectStore, ServiceError, ServiceResult, Services, StackDescription, StackEvent,
    StackRequest, StackService, StackStatus,
};
pub use state::{Compiled, Exported, Rendered, Staged};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::build_info::BuildInfo;
use crate::config::CompiledCluster;
use crate::render::TemplateRenderer;
use crate::types::{OperationTargets, StackName};

/// Name the stack service knows a stack by: the cluster name for the root,
/// `<cluster>-<LogicalId>` for nested stacks.
pub fn remote_stack_name(cluster: &StackName, stack: &StackName) -> String {
    if *stack == StackName::root() {
        cluster.to_string()
    } else {
        format!("{cluster}-{}", stack.logical_id())
    }
}

/// Human-readable outcome of an operation, one line per step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    lines: Vec<String>,
}

impl ProvisionReport {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

/// Drives the contract operations against one set of remote services.
pub struct Provisioner {
    services: Services,
    build: BuildInfo,
    renderer: Arc<dyn TemplateRenderer>,
    skip_wait: bool,
}

impl Provisioner {
    pub fn new(services: Services, build: BuildInfo, renderer: Arc<dyn TemplateRenderer>) -> Self {
        Self {
            services,
            build,
            renderer,
            skip_wait: false,
        }
    }

    /// Return right after each mutating call instead of polling for completion.
    pub fn skip_wait(mut self, skip_wait: bool) -> Self {
        self.skip_wait = skip_wait;
        self
    }

    pub fn build(&self) -> &BuildInfo {
        &self.build
    }

    fn settings(&self, compiled: &CompiledCluster) -> PollSettings {
        PollSettings::from_config(&compiled.config.stack_polling, self.skip_wait)
    }

    pub fn render(&self, compiled: &CompiledCluster) -> Result<Run<Rendered>> {
        Run::new(compiled.clone()).render(self.renderer.as_ref(), &self.build)
    }

    pub async fn validate_stack(
        &self,
        compiled: &CompiledCluster,
        targets: &OperationTargets,
    ) -> Result<ProvisionReport> {
        self.render(compiled)?
            .validate(Some(&self.services), targets)
            .await
    }

    /// Write every asset under `dir`; never touches the network.
    pub fn export(&self, compiled: &CompiledCluster, dir: &Path) -> Result<Run<Exported>> {
        self.render(compiled)?.export(dir)
    }

    pub async fn estimate_cost(
        &self,
        compiled: &CompiledCluster,
        targets: &OperationTargets,
    ) -> Result<Vec<String>> {
        self.render(compiled)?
            .estimate_cost(&self.services, targets)
            .await
    }

    pub async fn create(&self, compiled: &CompiledCluster) -> Result<ProvisionReport> {
        let settings = self.settings(compiled);
        self.render(compiled)?
            .stage(self.services.store.as_ref())
            .await?
            .create(&self.services, &settings)
            .await
    }

    pub async fn update(
        &self,
        compiled: &CompiledCluster,
        targets: &OperationTargets,
    ) -> Result<ProvisionReport> {
        let settings = self.settings(compiled);
        self.render(compiled)?
            .stage(self.services.store.as_ref())
            .await?
            .update(&self.services, targets, &settings)
            .await
    }

    pub async fn apply(
        &self,
        compiled: &CompiledCluster,
        targets: &OperationTargets,
    ) -> Result<ProvisionReport> {
        let settings = self.settings(compiled);
        self.render(compiled)?
            .stage(self.services.store.as_ref())
            .await?
            .apply(&self.services, targets, &settings)
            .await
    }

    pub async fn destroy(&self, compiled: &CompiledCluster) -> Result<ProvisionReport> {
        destroy(&self.services, compiled, &self.settings(compiled)).await
    }

    /// Diff targeted stacks against what the stack service has deployed.
    pub async fn diff(
        &self,
        compiled: &CompiledCluster,
        targets: &OperationTargets,
        context_lines: i32,
    ) -> Result<DiffReport> {
        let run = self.render(compiled)?;
        let cluster = &compiled.config.cluster_name;

        let mut current = BTreeMap::new();
        for stack in run.resolve_targets(targets)? {
            let name = remote_stack_name(cluster, &stack);
            match self.services.stacks.get_template(&name).await {
                Ok(template) => {
                    current.insert(stack, template);
                }
                Err(ServiceError::NotFound(_)) => {}
                Err(source) => {
                    return Err(ProvisionError::Remote {
                        stack: name,
                        operation: "get template",
                        source,
                    });
                }
            }
        }
        run.diff(targets, &current, context_lines)
    }
}
