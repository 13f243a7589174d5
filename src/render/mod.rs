// ABOUTME: Renders every stack of a compiled cluster into templates and userdata assets.
// ABOUTME: Children are rendered first so the generated root template can reference their URLs.

mod renderer;
pub mod root;
mod userdata;

pub use renderer::{SkeletonRenderer, TemplateDirRenderer, TemplateRenderer};
pub use userdata::{CLOUD_CONFIG_HEADER, PartValidator, UserdataPart, finalize};

use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::assets::{AssetError, AssetId, AssetLocation, AssetLocator, Assets};
use crate::build_info::BuildInfo;
use crate::config::{CompiledCluster, NodePoolConfig};
use crate::diagnostics::Diagnostics;
use crate::plugin::{
    EnabledPlugin, NodeRoleExtras, PluginError, TemplateError, Value, enabled_plugins,
    merge_node_role, merge_stack,
};
use crate::rollout::{self, RolloutError};
use crate::types::{NodeRole, StackKind, StackName};

/// File name of each stack's template asset.
pub const TEMPLATE_FILE: &str = "stack.json";

pub const CLUSTER_TAG: &str = "strata:cluster";
pub const STACK_TAG: &str = "strata:stack";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {} not found", .path.display())]
    MissingTemplate { path: PathBuf },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to render {}: {source}", .path.display())]
    Template {
        path: PathBuf,
        source: TemplateError,
    },

    #[error("stack {stack}: rendered template is not a JSON object: {message}")]
    InvalidTemplate { stack: StackName, message: String },

    /// Two children of the root map to one nested stack resource; a compile-time check should have caught it.
    #[error("stack {stack} would replace nested stack {logical_id} in the root template")]
    DuplicateLogicalId { stack: StackName, logical_id: String },

    #[error("userdata {part} for {role}: {message}")]
    Userdata {
        role: NodeRole,
        part: String,
        message: String,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Rollout(#[from] RolloutError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("failed to serialize render context: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// One stack of the hierarchy, before rendering.
#[derive(Debug, Clone)]
pub struct StackDescriptor {
    pub name: StackName,
    pub kind: StackKind,
    pub tags: BTreeMap<String, String>,
    /// Stacks that must finish before this one is created or updated.
    pub depends_on: Vec<StackName>,
    pub node_pool: Option<NodePoolConfig>,
}

impl StackDescriptor {
    pub fn logical_id(&self) -> String {
        self.name.logical_id()
    }
}

/// Descriptors in hierarchy order: root, network, etcd, control plane, then node pools.
pub fn stack_descriptors(compiled: &CompiledCluster) -> Result<Vec<StackDescriptor>> {
    let config = &compiled.config;
    let rollout = rollout::dependency_map(&compiled.node_pools)?;

    let describe = |name: StackName, kind, depends_on, node_pool| {
        let mut tags = config.stack_tags.clone();
        tags.insert(CLUSTER_TAG.to_string(), config.cluster_name.to_string());
        tags.insert(STACK_TAG.to_string(), name.to_string());
        StackDescriptor {
            name,
            kind,
            tags,
            depends_on,
            node_pool,
        }
    };

    let mut stacks = vec![
        describe(StackName::root(), StackKind::Root, vec![], None),
        describe(StackName::network(), StackKind::Network, vec![], None),
        describe(
            StackName::etcd(),
            StackKind::Etcd,
            vec![StackName::network()],
            None,
        ),
        describe(
            StackName::control_plane(),
            StackKind::ControlPlane,
            vec![StackName::network(), StackName::etcd()],
            None,
        ),
    ];

    for pool in &compiled.node_pools {
        let mut depends_on = vec![StackName::network(), StackName::control_plane()];
        depends_on.extend(rollout.get(&pool.name).cloned().unwrap_or_default());
        stacks.push(describe(
            pool.name.clone(),
            StackKind::NodePool,
            depends_on,
            Some(pool.clone()),
        ));
    }

    Ok(stacks)
}

/// Names of every stack in hierarchy order.
pub fn stack_names(compiled: &CompiledCluster) -> Vec<StackName> {
    let mut names = vec![
        StackName::root(),
        StackName::network(),
        StackName::etcd(),
        StackName::control_plane(),
    ];
    names.extend(compiled.node_pools.iter().map(|p| p.name.clone()));
    names
}

#[derive(Debug, Clone)]
pub struct RenderedStack {
    pub descriptor: StackDescriptor,
    /// Pretty-printed template JSON.
    pub template: String,
    pub location: AssetLocation,
}

impl RenderedStack {
    pub fn name(&self) -> &StackName {
        &self.descriptor.name
    }

    pub fn template_id(&self) -> AssetId {
        AssetId::new(self.descriptor.name.clone(), TEMPLATE_FILE)
    }
}

#[derive(Debug, Clone)]
pub struct RenderedCluster {
    /// Root first, then children in hierarchy order.
    pub stacks: Vec<RenderedStack>,
    pub assets: Assets,
}

impl RenderedCluster {
    pub fn stack(&self, name: &StackName) -> Option<&RenderedStack> {
        self.stacks.iter().find(|s| s.name() == name)
    }

    pub fn root(&self) -> Option<&RenderedStack> {
        self.stack(&StackName::root())
    }

    pub fn stack_names(&self) -> Vec<StackName> {
        self.stacks.iter().map(|s| s.name().clone()).collect()
    }
}

fn pool_value(pool: &NodePoolConfig) -> Result<Value> {
    let mut value = serde_json::to_value(pool)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("minCount".into(), pool.min_count().into());
        object.insert("maxCount".into(), pool.max_count().into());
        object.insert(
            "rollingUpdateMinInstancesInService".into(),
            pool.rolling_update_min_instances_in_service().into(),
        );
    }
    Ok(Value::from_json(&value))
}

fn stack_context(
    config: &Value,
    build: &BuildInfo,
    stack: &StackDescriptor,
    extras: &NodeRoleExtras,
    userdata: &BTreeMap<String, Value>,
) -> Result<Value> {
    let mut node_labels: BTreeMap<String, String> = stack
        .node_pool
        .as_ref()
        .map(|p| p.node_labels.clone())
        .unwrap_or_default();
    node_labels.extend(extras.node_labels.clone());

    let stack_value = serde_json::json!({
        "name": stack.name,
        "kind": stack.kind,
        "logicalId": stack.logical_id(),
        "dependsOn": stack.depends_on,
        "tags": stack.tags,
    });

    Ok(Value::Map(BTreeMap::from([
        ("config".to_string(), config.clone()),
        ("build".to_string(), Value::from_json(&serde_json::to_value(build)?)),
        ("stack".to_string(), Value::from_json(&stack_value)),
        (
            "nodePool".to_string(),
            match &stack.node_pool {
                Some(pool) => pool_value(pool)?,
                None => Value::Null,
            },
        ),
        ("extras".to_string(), Value::from_json(&serde_json::to_value(extras)?)),
        ("nodeLabels".to_string(), Value::from_json(&serde_json::to_value(&node_labels)?)),
        ("userdata".to_string(), Value::Map(userdata.clone())),
    ])))
}

struct StackRender<'a> {
    compiled: &'a CompiledCluster,
    renderer: &'a dyn TemplateRenderer,
    build: &'a BuildInfo,
    locator: AssetLocator,
    config: Value,
    plugins: Vec<EnabledPlugin<'a>>,
}

impl StackRender<'_> {
    fn child(
        &self,
        stack: &StackDescriptor,
        assets: &mut Assets,
        diagnostics: &mut Diagnostics,
    ) -> Result<RenderedStack> {
        let role = stack.kind.role();
        let extras = match role {
            Some(role) => merge_node_role(role, &self.plugins, &self.config)?,
            None => NodeRoleExtras::default(),
        };

        let mut userdata: BTreeMap<String, Value> = BTreeMap::new();
        if let Some(role) = role {
            let context = stack_context(&self.config, self.build, stack, &extras, &userdata)?;
            let parts = self.renderer.render_userdata(role, &context)?;
            for part in finalize(role, parts, &extras)? {
                let id = AssetId::new(stack.name.clone(), format!("userdata-{}", part.name));
                let asset = self
                    .locator
                    .asset(id, part.content, role != NodeRole::Worker);
                userdata.insert(
                    part.name,
                    Value::from_json(&serde_json::to_value(&asset.location)?),
                );
                assets.add(asset)?;
            }
        }

        let context = stack_context(&self.config, self.build, stack, &extras, &userdata)?;
        let text = self.renderer.render_template(stack.kind, &context)?;
        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| RenderError::InvalidTemplate {
                stack: stack.name.clone(),
                message: e.to_string(),
            })?;
        let serde_json::Value::Object(mut template) = parsed else {
            return Err(RenderError::InvalidTemplate {
                stack: stack.name.clone(),
                message: "expected an object at the top level".to_string(),
            });
        };

        let mut resources = merge_stack(
            stack.kind,
            stack.name.as_str(),
            &self.plugins,
            &self.config,
            diagnostics,
        )?;
        if let Some(role) = role
            && !extras.iam_statements.is_empty()
        {
            let (id, policy) = root::plugin_policy(stack, role, &extras.iam_statements);
            resources.insert(id, policy);
        }
        root::apply_resources(&mut template, stack.name.as_str(), resources, diagnostics);

        self.finish(stack.clone(), serde_json::Value::Object(template), assets)
    }

    fn root(
        &self,
        stack: StackDescriptor,
        children: &[(StackDescriptor, AssetLocation)],
        assets: &mut Assets,
        diagnostics: &mut Diagnostics,
    ) -> Result<RenderedStack> {
        let mut template = root::root_template(&self.compiled.config, self.build, children)?;
        let resources = merge_stack(
            StackKind::Root,
            stack.name.as_str(),
            &self.plugins,
            &self.config,
            diagnostics,
        )?;
        if let Some(object) = template.as_object_mut() {
            root::apply_resources(object, stack.name.as_str(), resources, diagnostics);
        }
        self.finish(stack, template, assets)
    }

    fn finish(
        &self,
        descriptor: StackDescriptor,
        template: serde_json::Value,
        assets: &mut Assets,
    ) -> Result<RenderedStack> {
        let text = serde_json::to_string_pretty(&template)?;
        let id = AssetId::new(descriptor.name.clone(), TEMPLATE_FILE);
        let asset = self.locator.asset(id, text.clone(), false);
        let location = asset.location.clone();
        assets.add(asset)?;
        tracing::debug!(stack = %descriptor.name, url = %location.url, "rendered stack");
        Ok(RenderedStack {
            descriptor,
            template: text,
            location,
        })
    }
}

/// Render every stack and collect their assets.
pub fn render_cluster(
    compiled: &CompiledCluster,
    renderer: &dyn TemplateRenderer,
    build: &BuildInfo,
    diagnostics: &mut Diagnostics,
) -> Result<RenderedCluster> {
    let config = Value::from_json(&serde_json::to_value(&compiled.config)?);
    let plugins = enabled_plugins(&compiled.plugins, &compiled.config.plugins, diagnostics)?;
    let render = StackRender {
        compiled,
        renderer,
        build,
        locator: AssetLocator::new(&compiled.config),
        config,
        plugins,
    };

    let mut descriptors = stack_descriptors(compiled)?.into_iter();
    let Some(root) = descriptors.next() else {
        return Ok(RenderedCluster {
            stacks: Vec::new(),
            assets: Assets::default(),
        });
    };

    let mut assets = Assets::default();
    let mut stacks: Vec<RenderedStack> = Vec::new();
    let mut children: Vec<(StackDescriptor, AssetLocation)> = Vec::new();
    for descriptor in descriptors {
        let rendered = render.child(&descriptor, &mut assets, diagnostics)?;
        children.push((descriptor, rendered.location.clone()));
        stacks.push(rendered);
    }

    let root = render.root(root, &children, &mut assets, diagnostics)?;
    stacks.insert(0, root);

    tracing::info!(
        stacks = stacks.len(),
        assets = assets.len(),
        "rendered cluster"
    );
    Ok(RenderedCluster { stacks, assets })
}
