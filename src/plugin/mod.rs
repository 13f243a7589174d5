// ABOUTME: Third-party plugin declarations and the engine merging them into stacks and node roles.
// ABOUTME: Plugins are loaded from plugin.yaml manifests and enabled per cluster by settings key.

mod merge;
mod source;
mod template;
mod value;

pub use merge::{
    ApiServerFlag, ApiServerVolume, EnabledPlugin, NodeRoleExtras, ProvisionedFile, ResourceMap,
    SystemdUnit, context, enabled_plugins, merge_node_role, merge_stack,
};
pub use source::{DirPluginSource, PLUGIN_MANIFEST, PluginSource};
pub use template::{TemplateError, is_template, render_template};
pub use value::{MergeError, Value};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::{NodeRole, StackKind};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse plugin manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("plugin {plugin}: settings key \"{key}\" is already used by plugin {other}")]
    DuplicateSettingsKey {
        plugin: String,
        other: String,
        key: String,
    },

    #[error("plugin {plugin}: invalid values override: {source}")]
    Values { plugin: String, source: MergeError },

    #[error("plugin {plugin}: failed to load content for {target}: {message}")]
    Content {
        plugin: String,
        target: String,
        message: String,
    },

    #[error("plugin {plugin}: failed to render {target}: {source}")]
    Render {
        plugin: String,
        target: String,
        source: TemplateError,
    },

    #[error("plugin {plugin}: failed to parse {target}: {message}")]
    Parse {
        plugin: String,
        target: String,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, PluginError>;

/// One loaded plugin declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plugin {
    pub metadata: PluginMetadata,
    #[serde(default)]
    pub spec: PluginSpec,
    /// Directory relative content sources resolve against.
    #[serde(skip)]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub settings_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSpec {
    #[serde(default)]
    pub cluster: ClusterContribution,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterContribution {
    /// Default values, overridable per cluster.
    #[serde(default)]
    pub values: Value,
    #[serde(default)]
    pub stacks: BTreeMap<StackKind, StackContribution>,
    #[serde(default)]
    pub roles: BTreeMap<NodeRole, RoleContribution>,
    #[serde(default)]
    pub kubernetes: KubernetesContribution,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackContribution {
    #[serde(default)]
    pub resources: ResourcesContribution,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourcesContribution {
    #[serde(default)]
    pub append: Option<Content>,
}

/// Text given inline or read from a file beside the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub enum Content {
    Inline(String),
    Source { path: PathBuf },
}

impl Content {
    pub fn load(&self, dir: &Path) -> std::io::Result<String> {
        match self {
            Content::Inline(text) => Ok(text.clone()),
            Content::Source { path } => std::fs::read_to_string(dir.join(path)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleContribution {
    #[serde(default)]
    pub files: Vec<FileContribution>,
    #[serde(default)]
    pub systemd: SystemdContribution,
    #[serde(default)]
    pub iam: IamContribution,
    #[serde(default)]
    pub node_labels: BTreeMap<String, Value>,
    #[serde(default)]
    pub feature_gates: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileContribution {
    pub path: String,
    #[serde(default)]
    pub permissions: Option<String>,
    pub content: Content,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemdContribution {
    #[serde(default)]
    pub units: Vec<UnitContribution>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitContribution {
    pub name: String,
    pub content: Content,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IamContribution {
    /// Policy statements, rendered as templates before use.
    #[serde(default)]
    pub statements: Vec<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KubernetesContribution {
    #[serde(default)]
    pub api_server: ApiServerContribution,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiServerContribution {
    #[serde(default)]
    pub flags: Vec<FlagContribution>,
    #[serde(default)]
    pub volumes: Vec<ApiServerVolume>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagContribution {
    pub name: String,
    pub value: String,
}

impl Plugin {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Key under `plugins` in cluster.yaml; defaults to the plugin name.
    pub fn settings_key(&self) -> &str {
        self.metadata
            .settings_key
            .as_deref()
            .unwrap_or(&self.metadata.name)
    }

    pub fn from_yaml(yaml: &str, dir: &Path) -> std::result::Result<Self, serde_yaml::Error> {
        let mut plugin: Plugin = serde_yaml::from_str(yaml)?;
        plugin.dir = dir.to_path_buf();
        Ok(plugin)
    }

    pub fn stack(&self, kind: StackKind) -> Option<&StackContribution> {
        self.spec.cluster.stacks.get(&kind)
    }

    pub fn role(&self, role: NodeRole) -> Option<&RoleContribution> {
        self.spec.cluster.roles.get(&role)
    }
}
