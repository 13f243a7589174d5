// ABOUTME: Merges enabled plugins' contributions into stack resource maps and node-role payloads.
// ABOUTME: Fragments are loaded, rendered against {values, config} and applied in declaration order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Content, Plugin, PluginError, Result, Value, render_template};
use crate::config::PluginConfig;
use crate::diagnostics::{Diagnostics, Warning};
use crate::types::{NodeRole, StackKind};

/// Template resources keyed by logical id.
pub type ResourceMap = BTreeMap<String, serde_json::Value>;

/// A plugin enabled for this cluster with its effective values.
#[derive(Debug, Clone)]
pub struct EnabledPlugin<'a> {
    pub plugin: &'a Plugin,
    pub values: Value,
}

impl EnabledPlugin<'_> {
    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    fn load(&self, content: &Content, target: &str) -> Result<String> {
        content
            .load(&self.plugin.dir)
            .map_err(|e| PluginError::Content {
                plugin: self.name().to_string(),
                target: target.to_string(),
                message: e.to_string(),
            })
    }

    fn render(&self, text: &str, context: &Value, target: &str) -> Result<String> {
        render_template(text, context).map_err(|source| PluginError::Render {
            plugin: self.name().to_string(),
            target: target.to_string(),
            source,
        })
    }

    fn render_value(&self, value: &Value, context: &Value, target: &str) -> Result<Value> {
        value.render(context).map_err(|source| PluginError::Render {
            plugin: self.name().to_string(),
            target: target.to_string(),
            source,
        })
    }

    fn context(&self, config: &Value) -> Value {
        context(&self.values, config)
    }
}

/// Template context `{values, config}` for one plugin.
pub fn context(values: &Value, config: &Value) -> Value {
    Value::Map(BTreeMap::from([
        ("values".to_string(), values.clone()),
        ("config".to_string(), config.clone()),
    ]))
}

/// Plugins whose settings key is enabled in `configs`, with defaults overlaid by overrides.
pub fn enabled_plugins<'a>(
    plugins: &'a [Plugin],
    configs: &BTreeMap<String, PluginConfig>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<EnabledPlugin<'a>>> {
    for key in configs.keys() {
        if !plugins.iter().any(|p| p.settings_key() == key) {
            diagnostics.warn(Warning::unknown_plugin(key));
        }
    }

    let mut enabled = Vec::new();
    for plugin in plugins {
        let Some(config) = configs.get(plugin.settings_key()).filter(|c| c.enabled) else {
            continue;
        };
        let values = plugin
            .spec
            .cluster
            .values
            .overlay(&config.values, "values")
            .map_err(|source| PluginError::Values {
                plugin: plugin.name().to_string(),
                source,
            })?;
        tracing::debug!(plugin = plugin.name(), "plugin enabled");
        enabled.push(EnabledPlugin { plugin, values });
    }
    Ok(enabled)
}

/// Resources contributed to a stack of `kind`; later plugins overwrite earlier ones on key collision.
pub fn merge_stack(
    kind: StackKind,
    stack: &str,
    plugins: &[EnabledPlugin<'_>],
    config: &Value,
    diagnostics: &mut Diagnostics,
) -> Result<ResourceMap> {
    let mut resources = ResourceMap::new();
    let mut owners: BTreeMap<String, &str> = BTreeMap::new();
    let target = format!("stack {stack} resources");

    for enabled in plugins {
        let Some(content) = enabled
            .plugin
            .stack(kind)
            .and_then(|s| s.resources.append.as_ref())
        else {
            continue;
        };

        let text = enabled.load(content, &target)?;
        let rendered = enabled.render(&text, &enabled.context(config), &target)?;
        if rendered.trim().is_empty() {
            continue;
        }

        let parsed: serde_json::Value =
            serde_yaml::from_str(&rendered).map_err(|e| PluginError::Parse {
                plugin: enabled.name().to_string(),
                target: target.clone(),
                message: e.to_string(),
            })?;
        let serde_json::Value::Object(fragment) = parsed else {
            return Err(PluginError::Parse {
                plugin: enabled.name().to_string(),
                target: target.clone(),
                message: "expected a mapping of logical ids to resources".to_string(),
            });
        };

        for (key, value) in fragment {
            if let Some(earlier) = owners.insert(key.clone(), enabled.name()) {
                diagnostics.warn(Warning::resource_collision(stack, &key, earlier, enabled.name()));
            }
            resources.insert(key, value);
        }
    }

    Ok(resources)
}

/// Provisioning payload plugins add to machines of one role.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRoleExtras {
    pub files: Vec<ProvisionedFile>,
    pub units: Vec<SystemdUnit>,
    pub iam_statements: Vec<serde_json::Value>,
    pub node_labels: BTreeMap<String, String>,
    pub feature_gates: BTreeMap<String, String>,
    pub api_server_flags: Vec<ApiServerFlag>,
    pub api_server_volumes: Vec<ApiServerVolume>,
}

impl NodeRoleExtras {
    pub fn is_empty(&self) -> bool {
        self == &NodeRoleExtras::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedFile {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemdUnit {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiServerFlag {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiServerVolume {
    pub name: String,
    pub path: String,
}

/// Concatenate every enabled plugin's contributions for `role` in declaration order.
///
/// Labels and feature gates are maps, so later plugins win per key. API server
/// flags and volumes only apply to controllers.
pub fn merge_node_role(
    role: NodeRole,
    plugins: &[EnabledPlugin<'_>],
    config: &Value,
) -> Result<NodeRoleExtras> {
    let mut extras = NodeRoleExtras::default();

    for enabled in plugins {
        let context = enabled.context(config);

        if let Some(contribution) = enabled.plugin.role(role) {
            for file in &contribution.files {
                let target = format!("role {role} file {}", file.path);
                let text = enabled.load(&file.content, &target)?;
                extras.files.push(ProvisionedFile {
                    path: file.path.clone(),
                    permissions: file.permissions.clone(),
                    content: enabled.render(&text, &context, &target)?,
                });
            }

            for unit in &contribution.systemd.units {
                let target = format!("role {role} unit {}", unit.name);
                let text = enabled.load(&unit.content, &target)?;
                extras.units.push(SystemdUnit {
                    name: unit.name.clone(),
                    content: enabled.render(&text, &context, &target)?,
                });
            }

            let target = format!("role {role} iam statements");
            for statement in &contribution.iam.statements {
                let rendered = enabled.render_value(statement, &context, &target)?;
                extras.iam_statements.push(rendered.to_json());
            }

            let target = format!("role {role} node labels");
            for (key, value) in &contribution.node_labels {
                let rendered = enabled.render_value(value, &context, &target)?;
                extras.node_labels.insert(key.clone(), rendered.to_string());
            }

            let target = format!("role {role} feature gates");
            for (key, value) in &contribution.feature_gates {
                let rendered = enabled.render_value(value, &context, &target)?;
                extras.feature_gates.insert(key.clone(), rendered.to_string());
            }
        }

        if role == NodeRole::Controller {
            let api_server = &enabled.plugin.spec.cluster.kubernetes.api_server;
            for flag in &api_server.flags {
                let target = format!("apiserver flag {}", flag.name);
                extras.api_server_flags.push(ApiServerFlag {
                    name: flag.name.clone(),
                    value: enabled.render(&flag.value, &context, &target)?,
                });
            }
            extras
                .api_server_volumes
                .extend(api_server.volumes.iter().cloned());
        }
    }

    Ok(extras)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::WarningKind;
    use std::path::Path;

    fn plugin(yaml: &str) -> Plugin {
        Plugin::from_yaml(yaml, Path::new(".")).unwrap()
    }

    fn enable(keys: &[&str]) -> BTreeMap<String, PluginConfig> {
        keys.iter()
            .map(|k| {
                (
                    k.to_string(),
                    PluginConfig {
                        enabled: true,
                        values: Value::default(),
                    },
                )
            })
            .collect()
    }

    fn config() -> Value {
        serde_yaml::from_str("region: us-west-1\nclusterName: prod\n").unwrap()
    }

    const FIRST: &str = r#"
metadata: {name: first}
spec:
  cluster:
    values: {bucket: first-bucket}
    stacks:
      root:
        resources:
          append:
            inline: '{"X": {"Type": "{{ .values.bucket }}"}, "A": {"Type": "a"}}'
    roles:
      worker:
        nodeLabels: {first: "yes", shared: first}
        featureGates: {Alpha: true}
"#;

    const SECOND: &str = r#"
metadata: {name: second}
spec:
  cluster:
    stacks:
      root:
        resources:
          append:
            inline: '{"X": {"Type": "second"}}'
    roles:
      worker:
        nodeLabels: {second: "yes", shared: second}
        systemd:
          units:
            - name: agent.service
              content:
                inline: "[Service]\nEnvironment=REGION={{ .config.region }}\n"
"#;

    #[test]
    fn disabled_plugins_are_skipped() {
        let plugins = vec![plugin(FIRST), plugin(SECOND)];
        let mut configs = enable(&["first", "second"]);
        configs.get_mut("second").unwrap().enabled = false;
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &configs, &mut diag).unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name(), "first");
    }

    #[test]
    fn unknown_plugin_config_warns() {
        let plugins = vec![plugin(FIRST)];
        let mut diag = Diagnostics::default();
        enabled_plugins(&plugins, &enable(&["first", "ghost"]), &mut diag).unwrap();
        assert_eq!(diag.warnings()[0].kind, WarningKind::UnknownPlugin);
    }

    #[test]
    fn later_plugin_wins_resource_collision() {
        let plugins = vec![plugin(FIRST), plugin(SECOND)];
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &enable(&["first", "second"]), &mut diag).unwrap();

        let resources = merge_stack(StackKind::Root, "root", &enabled, &config(), &mut diag).unwrap();
        assert_eq!(resources["X"]["Type"], "second");
        assert_eq!(resources["A"]["Type"], "a");
        assert!(
            diag.warnings()
                .iter()
                .any(|w| w.kind == WarningKind::ResourceCollision)
        );
    }

    #[test]
    fn values_override_reaches_templates() {
        let plugins = vec![plugin(FIRST)];
        let mut configs = enable(&["first"]);
        configs.get_mut("first").unwrap().values =
            serde_yaml::from_str("bucket: override").unwrap();
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &configs, &mut diag).unwrap();
        let resources = merge_stack(StackKind::Root, "root", &enabled, &config(), &mut diag).unwrap();
        assert_eq!(resources["X"]["Type"], "override");
    }

    #[test]
    fn override_type_mismatch_is_fatal() {
        let plugins = vec![plugin(FIRST)];
        let mut configs = enable(&["first"]);
        configs.get_mut("first").unwrap().values = serde_yaml::from_str("bucket: [a]").unwrap();
        let mut diag = Diagnostics::default();
        let err = enabled_plugins(&plugins, &configs, &mut diag).unwrap_err();
        assert!(matches!(err, PluginError::Values { plugin, .. } if plugin == "first"));
    }

    #[test]
    fn node_labels_merge_by_key() {
        let plugins = vec![plugin(FIRST), plugin(SECOND)];
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &enable(&["first", "second"]), &mut diag).unwrap();
        let extras = merge_node_role(NodeRole::Worker, &enabled, &config()).unwrap();
        assert_eq!(extras.node_labels["first"], "yes");
        assert_eq!(extras.node_labels["second"], "yes");
        assert_eq!(extras.node_labels["shared"], "second");
        assert_eq!(extras.feature_gates["Alpha"], "true");
        assert_eq!(extras.units.len(), 1);
        assert!(extras.units[0].content.contains("REGION=us-west-1"));
    }

    #[test]
    fn roles_without_contributions_are_empty() {
        let plugins = vec![plugin(FIRST)];
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &enable(&["first"]), &mut diag).unwrap();
        assert!(merge_node_role(NodeRole::Etcd, &enabled, &config()).unwrap().is_empty());
    }

    #[test]
    fn render_failure_names_plugin_and_target() {
        let broken = plugin(
            "metadata: {name: broken}\nspec:\n  cluster:\n    stacks:\n      etcd:\n        resources:\n          append:\n            inline: '{\"A\": \"{{ .values.missing }}\"}'\n",
        );
        let plugins = vec![broken];
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &enable(&["broken"]), &mut diag).unwrap();
        let err = merge_stack(StackKind::Etcd, "etcd", &enabled, &config(), &mut diag).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("plugin broken"));
        assert!(message.contains("stack etcd resources"));
    }

    #[test]
    fn non_mapping_fragment_rejected() {
        let list = plugin(
            "metadata: {name: list}\nspec:\n  cluster:\n    stacks:\n      network:\n        resources:\n          append:\n            inline: '[1, 2]'\n",
        );
        let plugins = vec![list];
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &enable(&["list"]), &mut diag).unwrap();
        assert!(matches!(
            merge_stack(StackKind::Network, "network", &enabled, &config(), &mut diag),
            Err(PluginError::Parse { .. })
        ));
    }

    #[test]
    fn api_server_contributions_only_for_controllers() {
        let flags = plugin(
            "metadata: {name: flags}\nspec:\n  cluster:\n    kubernetes:\n      apiServer:\n        flags:\n          - {name: audit-log-path, value: /var/log/audit}\n        volumes:\n          - {name: audit, path: /var/log}\n",
        );
        let plugins = vec![flags];
        let mut diag = Diagnostics::default();
        let enabled = enabled_plugins(&plugins, &enable(&["flags"]), &mut diag).unwrap();
        let controller = merge_node_role(NodeRole::Controller, &enabled, &config()).unwrap();
        assert_eq!(controller.api_server_flags.len(), 1);
        assert_eq!(controller.api_server_volumes[0].path, "/var/log");
        let worker = merge_node_role(NodeRole::Worker, &enabled, &config()).unwrap();
        assert!(worker.api_server_flags.is_empty());
    }
}
