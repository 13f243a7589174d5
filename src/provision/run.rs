// ABOUTME: Provisioning run parameterized by state marker.
// ABOUTME: Each transition consumes the run; rendering always completes before anything is staged.

use chrono::Utc;
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::diff::{DiffReport, StackDiff};
use super::error::{DeployedTemplateSnafu, IoSnafu, ProvisionError, RemoteSnafu, Result};
use super::events::failure_lines;
use super::poll::{PollSettings, wait_for_terminal};
use super::services::{ObjectStore, ServiceError, Services, StackRequest, StackService};
use super::state::{Compiled, Exported, Rendered, Staged};
use super::{ProvisionReport, remote_stack_name};
use crate::assets::{Asset, AssetError, AssetId, AssetLocator, export_path};
use crate::build_info::BuildInfo;
use crate::config::{CompiledCluster, S3Uri, StackPolling};
use crate::diagnostics::{Diagnostics, Warning};
use crate::diff::TemplateDiff;
use crate::render::{
    RenderError, RenderedCluster, RenderedStack, TEMPLATE_FILE, TemplateRenderer, render_cluster,
    root,
};
use crate::types::{OperationTargets, StackName};

/// A provisioning run in progress, parameterized by its current state.
#[derive(Debug)]
pub struct Run<S> {
    pub(crate) compiled: CompiledCluster,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) state: S,
}

impl Run<Compiled> {
    pub fn new(compiled: CompiledCluster) -> Self {
        Run {
            compiled,
            diagnostics: Diagnostics::default(),
            state: Compiled,
        }
    }

    /// Render every stack and its assets.
    ///
    /// # Errors
    ///
    /// Any template, userdata or plugin failure aborts the run before staging.
    #[must_use = "rendering returns a new run that must be used"]
    pub fn render(
        mut self,
        renderer: &dyn TemplateRenderer,
        build: &BuildInfo,
    ) -> Result<Run<Rendered>> {
        let cluster = render_cluster(&self.compiled, renderer, build, &mut self.diagnostics)?;
        Ok(Run {
            compiled: self.compiled,
            diagnostics: self.diagnostics,
            state: Rendered { cluster },
        })
    }
}

impl<S> Run<S> {
    pub fn compiled(&self) -> &CompiledCluster {
        &self.compiled
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Name of the root stack at the stack service.
    pub fn root_stack_name(&self) -> String {
        self.compiled.config.cluster_name.to_string()
    }

    fn s3(&self, operation: &'static str) -> Result<S3Uri> {
        self.compiled
            .config
            .s3_uri
            .clone()
            .ok_or(ProvisionError::MissingS3Uri { operation })
    }

    fn polling(&self) -> &StackPolling {
        &self.compiled.config.stack_polling
    }
}

/// Upload one asset, retrying transient failures within the polling budget.
async fn upload(
    store: &dyn ObjectStore,
    s3: &S3Uri,
    asset: &Asset,
    polling: &StackPolling,
) -> Result<()> {
    let mut attempts = 0u32;
    loop {
        match store
            .put(s3.bucket(), &asset.location.key, asset.content.as_bytes())
            .await
        {
            Ok(()) => {
                tracing::debug!(asset = %asset.id, key = %asset.location.key, "staged asset");
                return Ok(());
            }
            Err(e) if e.is_transient() && attempts < polling.max_transient_retries => {
                attempts += 1;
                tracing::warn!(asset = %asset.id, attempt = attempts, error = %e, "retrying upload");
                tokio::time::sleep(polling.interval).await;
            }
            Err(source) => {
                return Err(ProvisionError::Stage {
                    stack: asset.id.stack.clone(),
                    asset: asset.id.clone(),
                    source,
                });
            }
        }
    }
}

impl Run<Rendered> {
    pub fn rendered(&self) -> &RenderedCluster {
        &self.state.cluster
    }

    /// Targeted stacks in hierarchy order.
    pub fn resolve_targets(&self, targets: &OperationTargets) -> Result<Vec<StackName>> {
        Ok(targets.resolve(&self.state.cluster.stack_names())?)
    }

    fn targeted_stacks(&self, targets: &OperationTargets) -> Result<Vec<&RenderedStack>> {
        Ok(self
            .resolve_targets(targets)?
            .iter()
            .filter_map(|name| self.state.cluster.stack(name))
            .collect())
    }

    fn template_asset(&self, stack: &RenderedStack) -> Result<&Asset> {
        let id = stack.template_id();
        self.state
            .cluster
            .assets
            .get(&id)
            .ok_or_else(|| RenderError::Asset(AssetError::Missing(id)).into())
    }

    /// Check the external DNS name against the configured hosted zone's domain.
    async fn check_hosted_zone(&self, services: &Services) -> Result<()> {
        let dns = &self.compiled.config.dns;
        let (Some(zones), true, Some(zone_id)) = (
            services.zones.as_ref(),
            dns.create_record_set,
            dns.hosted_zone_id.as_deref(),
        ) else {
            return Ok(());
        };
        let domain = zones.zone_domain(zone_id).await.context(RemoteSnafu {
            stack: self.root_stack_name(),
            operation: "hosted zone lookup",
        })?;
        dns.validate_zone_domain(&domain)?;
        Ok(())
    }

    /// Validate every targeted stack, remotely when services are given.
    ///
    /// Remote validation stages each template first so it can be submitted by URL.
    pub async fn validate(
        &self,
        services: Option<&Services>,
        targets: &OperationTargets,
    ) -> Result<ProvisionReport> {
        let stacks = self.targeted_stacks(targets)?;
        let mut report = ProvisionReport::default();

        let Some(services) = services else {
            for stack in stacks {
                let template: serde_json::Value = serde_json::from_str(&stack.template)
                    .map_err(RenderError::from)?;
                let resources = template
                    .get("Resources")
                    .and_then(serde_json::Value::as_object)
                    .map_or(0, serde_json::Map::len);
                report.push(format!(
                    "{}: template is valid ({resources} resources)",
                    stack.name()
                ));
            }
            return Ok(report);
        };

        self.check_hosted_zone(services).await?;
        let s3 = self.s3("validate")?;
        for stack in stacks {
            let asset = self.template_asset(stack)?;
            upload(services.store.as_ref(), &s3, asset, self.polling()).await?;
            let result = services
                .stacks
                .validate_template(&asset.location.url)
                .await
                .context(RemoteSnafu {
                    stack: stack.name().to_string(),
                    operation: "validate",
                })?;
            tracing::info!(stack = %stack.name(), "template validated");
            report.push(format!("Validation Report: {}\n{result}", stack.name()));
        }
        Ok(report)
    }

    /// Cost estimate URLs for every targeted stack; never mutates remote stacks.
    pub async fn estimate_cost(
        &self,
        services: &Services,
        targets: &OperationTargets,
    ) -> Result<Vec<String>> {
        let s3 = self.s3("estimate-cost")?;
        let mut urls = Vec::new();
        for stack in self.targeted_stacks(targets)? {
            let asset = self.template_asset(stack)?;
            upload(services.store.as_ref(), &s3, asset, self.polling()).await?;
            let url = services
                .stacks
                .estimate_cost(&asset.location.url)
                .await
                .context(RemoteSnafu {
                    stack: stack.name().to_string(),
                    operation: "estimate cost",
                })?;
            urls.push(url);
        }
        Ok(urls)
    }

    /// Compare targeted stacks against their current templates; absent ones compare as empty.
    pub fn diff(
        &self,
        targets: &OperationTargets,
        current: &BTreeMap<StackName, String>,
        context_lines: i32,
    ) -> Result<DiffReport> {
        let stacks = self
            .targeted_stacks(targets)?
            .into_iter()
            .map(|stack| StackDiff {
                stack: stack.name().clone(),
                diff: TemplateDiff::new(
                    current.get(stack.name()).map_or("", String::as_str),
                    &stack.template,
                    context_lines,
                ),
            })
            .collect();
        Ok(DiffReport { stacks })
    }

    /// Diff against a tree written earlier by [`Run::export`].
    pub fn diff_exported(
        &self,
        dir: &Path,
        targets: &OperationTargets,
        context_lines: i32,
    ) -> Result<DiffReport> {
        let mut current = BTreeMap::new();
        for name in self.resolve_targets(targets)? {
            let path = export_path(dir, &AssetId::new(name.clone(), TEMPLATE_FILE));
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    current.insert(name, text);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ProvisionError::Io { path, source }),
            }
        }
        self.diff(targets, &current, context_lines)
    }

    /// Write every asset under `dir`, mirroring its stack/file address.
    #[must_use = "exporting returns a new run that must be used"]
    pub fn export(mut self, dir: &Path) -> Result<Run<Exported>> {
        let mut files = Vec::with_capacity(self.state.cluster.assets.len());
        let mut secrets = 0usize;
        for asset in self.state.cluster.assets.iter() {
            let path = export_path(dir, &asset.id);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).context(IoSnafu {
                    path: parent.to_path_buf(),
                })?;
            }
            std::fs::write(&path, &asset.content).context(IoSnafu { path: path.clone() })?;
            if asset.secret {
                secrets += 1;
            }
            files.push(path);
        }

        if secrets > 0 && self.compiled.config.kms_key_arn.is_none() {
            self.diagnostics.warn(Warning::unencrypted_secrets(format!(
                "{secrets} exported assets carry credentials but kmsKeyArn is not set; they were written unencrypted to {}",
                dir.display()
            )));
        }
        tracing::info!(dir = %dir.display(), files = files.len(), "exported assets");

        Ok(Run {
            compiled: self.compiled,
            diagnostics: self.diagnostics,
            state: Exported {
                dir: dir.to_path_buf(),
                files,
            },
        })
    }

    /// Upload every asset; stacks are staged concurrently, each stack's assets in order.
    #[must_use = "staging returns a new run that must be used"]
    pub async fn stage(self, store: &dyn ObjectStore) -> Result<Run<Staged>> {
        let s3 = self.s3("staging")?;
        let polling = *self.polling();

        let mut by_stack: BTreeMap<&StackName, Vec<&Asset>> = BTreeMap::new();
        for asset in self.state.cluster.assets.iter() {
            by_stack.entry(&asset.id.stack).or_default().push(asset);
        }
        let uploads = by_stack.into_values().map(|assets| {
            let s3 = &s3;
            async move {
                for asset in assets {
                    upload(store, s3, asset, &polling).await?;
                }
                Ok::<_, ProvisionError>(())
            }
        });
        futures::future::try_join_all(uploads).await?;
        tracing::info!(
            assets = self.state.cluster.assets.len(),
            bucket = s3.bucket(),
            "staged assets"
        );

        Ok(Run {
            compiled: self.compiled,
            diagnostics: self.diagnostics,
            state: Staged {
                cluster: self.state.cluster,
            },
        })
    }
}

impl Run<Exported> {
    pub fn dir(&self) -> &Path {
        &self.state.dir
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.state.files
    }
}

impl Run<Staged> {
    pub fn rendered(&self) -> &RenderedCluster {
        &self.state.cluster
    }

    fn root(&self) -> Result<&RenderedStack> {
        self.state.cluster.root().ok_or_else(|| {
            let id = AssetId::new(StackName::root(), TEMPLATE_FILE);
            RenderError::Asset(AssetError::Missing(id)).into()
        })
    }

    fn request(&self, template_url: String) -> Result<StackRequest> {
        let root = self.root()?;
        Ok(StackRequest {
            name: self.root_stack_name(),
            template_url,
            tags: root.descriptor.tags.clone(),
            policy: self.compiled.config.stack_policy.clone(),
        })
    }

    /// Wait for the root stack and turn a failed terminal status into an error with its events.
    async fn settle(
        &self,
        stacks: &dyn StackService,
        settings: &PollSettings,
        started: chrono::DateTime<Utc>,
        report: &mut ProvisionReport,
    ) -> Result<()> {
        let name = self.root_stack_name();
        if settings.skip_wait {
            report.push(format!("not waiting for stack {name}"));
            return Ok(());
        }

        let Some(description) = wait_for_terminal(stacks, &name, settings).await? else {
            return Err(ProvisionError::Remote {
                stack: name.clone(),
                operation: "describe",
                source: ServiceError::NotFound(name),
            });
        };
        if description.status.is_success() {
            report.push(format!("stack {name} is {}", description.status));
            return Ok(());
        }

        let events = stacks.list_events(&name).await.context(RemoteSnafu {
            stack: name.clone(),
            operation: "list events",
        })?;
        Err(ProvisionError::StackFailed {
            stack: name,
            status: description.status.to_string(),
            events: failure_lines(&events, Some(started)),
        })
    }

    /// Create the root stack and, through it, every nested stack.
    pub async fn create(
        self,
        services: &Services,
        settings: &PollSettings,
    ) -> Result<ProvisionReport> {
        let root_stack = self.root()?;
        let request = self.request(root_stack.location.url.clone())?;
        let started = Utc::now();

        let id = services
            .stacks
            .create_stack(&request)
            .await
            .context(RemoteSnafu {
                stack: request.name.clone(),
                operation: "create",
            })?;
        tracing::info!(stack = %request.name, id = %id, "create issued");

        let mut report = ProvisionReport::default();
        report.push(format!("creating stack {}", request.name));
        self.settle(services.stacks.as_ref(), settings, started, &mut report)
            .await?;
        Ok(report)
    }

    /// Update the targeted stacks; every other nested stack keeps its deployed template.
    pub async fn update(
        self,
        services: &Services,
        targets: &OperationTargets,
        settings: &PollSettings,
    ) -> Result<ProvisionReport> {
        let name = self.root_stack_name();
        let targets = targets.resolve(&self.state.cluster.stack_names())?;
        let root_stack = self.root()?;

        let mut template_url = root_stack.location.url.clone();
        if targets.len() < self.state.cluster.stacks.len() {
            let deployed = services.stacks.get_template(&name).await.context(RemoteSnafu {
                stack: name.clone(),
                operation: "get template",
            })?;
            let deployed: serde_json::Value =
                serde_json::from_str(&deployed).context(DeployedTemplateSnafu {
                    stack: name.clone(),
                })?;
            let mut desired: serde_json::Value = serde_json::from_str(&root_stack.template)
                .map_err(RenderError::from)?;

            let mut missing = Vec::new();
            for child in &self.state.cluster.stacks[1..] {
                if targets.contains(child.name()) {
                    continue;
                }
                let logical_id = child.descriptor.logical_id();
                match root::template_url(&deployed, &logical_id) {
                    Some(url) => {
                        root::set_template_url(&mut desired, &logical_id, url);
                    }
                    None => missing.push(child.name().clone()),
                }
            }
            if !missing.is_empty() {
                return Err(ProvisionError::NotDeployed { stacks: missing });
            }

            let text = serde_json::to_string_pretty(&desired)
                .map_err(RenderError::from)?;
            let asset = AssetLocator::new(&self.compiled.config).asset(
                AssetId::new(StackName::root(), TEMPLATE_FILE),
                text,
                false,
            );
            upload(
                services.store.as_ref(),
                &self.s3("update")?,
                &asset,
                self.polling(),
            )
            .await?;
            template_url = asset.location.url;
        }

        let request = self.request(template_url)?;
        let started = Utc::now();
        let mut report = ProvisionReport::default();
        match services.stacks.update_stack(&request).await {
            Ok(id) => {
                tracing::info!(stack = %name, id = %id, "update issued");
                report.push(format!(
                    "updating stack {name} ({})",
                    targets
                        .iter()
                        .map(StackName::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            Err(ServiceError::NoUpdates) => {
                report.push(format!("stack {name} is up to date"));
                return Ok(report);
            }
            Err(source) => {
                return Err(ProvisionError::Remote {
                    stack: name,
                    operation: "update",
                    source,
                });
            }
        }

        self.settle(services.stacks.as_ref(), settings, started, &mut report)
            .await?;
        Ok(report)
    }

    /// Create the cluster when its root stack is absent, otherwise update the targets.
    pub async fn apply(
        self,
        services: &Services,
        targets: &OperationTargets,
        settings: &PollSettings,
    ) -> Result<ProvisionReport> {
        let name = self.root_stack_name();
        match services.stacks.describe_stack(&name).await {
            Err(ServiceError::NotFound(_)) => self.create(services, settings).await,
            Ok(_) => self.update(services, targets, settings).await,
            Err(source) => Err(ProvisionError::Remote {
                stack: name,
                operation: "describe",
                source,
            }),
        }
    }
}

/// Delete the cluster's root stack; an absent stack counts as deleted.
pub async fn destroy(
    services: &Services,
    compiled: &CompiledCluster,
    settings: &PollSettings,
) -> Result<ProvisionReport> {
    let name = remote_stack_name(&compiled.config.cluster_name, &StackName::root());
    let mut report = ProvisionReport::default();

    match services.stacks.delete_stack(&name).await {
        Ok(()) => report.push(format!("deleting stack {name}")),
        Err(ServiceError::NotFound(_)) => {
            report.push(format!("stack {name} does not exist"));
            return Ok(report);
        }
        Err(source) => {
            return Err(ProvisionError::Remote {
                stack: name,
                operation: "delete",
                source,
            });
        }
    }

    if settings.skip_wait {
        report.push(format!("not waiting for stack {name}"));
        return Ok(report);
    }

    match wait_for_terminal(services.stacks.as_ref(), &name, settings).await? {
        None => report.push(format!("stack {name} deleted")),
        Some(description) if description.status.is_success() => {
            report.push(format!("stack {name} is {}", description.status));
        }
        Some(description) => {
            let events = services
                .stacks
                .list_events(&name)
                .await
                .context(RemoteSnafu {
                    stack: name.clone(),
                    operation: "list events",
                })?;
            return Err(ProvisionError::StackFailed {
                stack: name,
                status: description.status.to_string(),
                events: failure_lines(&events, None),
            });
        }
    }
    Ok(report)
}
