// ABOUTME: Tests for loading plugins from a project and merging them into rendered stacks.
// ABOUTME: Covers declaration order, resource collisions, value overrides and render failures.

mod support;

use std::path::Path;
use strata::build_info::BuildInfo;
use strata::diagnostics::{Diagnostics, WarningKind};
use strata::plugin::{
    DirPluginSource, PluginError, PluginSource, Value, enabled_plugins, merge_node_role,
};
use strata::provision::Run;
use strata::render::{RenderError, SkeletonRenderer};
use strata::types::{NodeRole, StackName};
use support::{CLUSTER, compile_yaml};

const ALPHA: &str = r#"
metadata:
  name: alpha
spec:
  cluster:
    stacks:
      nodePool:
        resources:
          append:
            inline: '{"Shared": {"Type": "AWS::SNS::Topic"}, "AlphaQueue": {"Type": "AWS::SQS::Queue"}}'
    roles:
      worker:
        nodeLabels:
          alpha: "yes"
        files:
          - path: /etc/alpha.conf
            permissions: "0644"
            content:
              inline: "enabled=true"
"#;

const BETA: &str = r#"
metadata:
  name: beta
  version: 1.2.0
spec:
  cluster:
    values:
      tier: gold
    stacks:
      nodePool:
        resources:
          append:
            source:
              path: resources.yaml
    roles:
      worker:
        nodeLabels:
          tier: "{{ .values.tier }}"
"#;

const BETA_RESOURCES: &str = "Shared:\n  Type: AWS::SNS::Subscription\n  Properties:\n    Region: \"{{ .config.region }}\"\n";

const ENABLE_BOTH: &str =
    "plugins:\n  alpha:\n    enabled: true\n  beta:\n    enabled: true\n    values: {tier: platinum}\n";

fn write_plugin(root: &Path, name: &str, manifest: &str) {
    let dir = root.join("plugins").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("plugin.yaml"), manifest).unwrap();
}

fn project() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    // beta is written first; loading still follows directory name order
    write_plugin(tmp.path(), "beta", BETA);
    std::fs::write(tmp.path().join("plugins/beta/resources.yaml"), BETA_RESOURCES).unwrap();
    write_plugin(tmp.path(), "alpha", ALPHA);
    tmp
}

fn json(text: &str) -> serde_json::Value {
    serde_json::from_str(text).unwrap()
}

mod loading {
    use super::*;

    #[test]
    fn plugins_load_in_directory_order() {
        let tmp = project();
        let plugins = DirPluginSource::for_project(tmp.path()).load().unwrap();
        let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["alpha", "beta"]);
        assert_eq!(plugins[1].metadata.version.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn missing_plugin_directory_means_no_plugins() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(DirPluginSource::for_project(tmp.path()).load().unwrap().is_empty());
    }

    #[test]
    fn duplicate_settings_keys_are_rejected() {
        let tmp = project();
        write_plugin(
            tmp.path(),
            "gamma",
            "metadata:\n  name: gamma\n  settingsKey: alpha\n",
        );

        let err = DirPluginSource::for_project(tmp.path()).load().unwrap_err();
        assert!(matches!(
            err,
            PluginError::DuplicateSettingsKey { ref plugin, ref other, .. }
                if plugin == "gamma" && other == "alpha"
        ));
    }

    #[test]
    fn malformed_manifest_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "broken", "metadata:\n  name: broken\nspce: {}\n");

        let err = DirPluginSource::for_project(tmp.path()).load().unwrap_err();
        assert!(matches!(err, PluginError::Manifest { .. }));
        assert!(err.to_string().contains("broken/plugin.yaml"));
    }
}

mod merging {
    use super::*;

    fn render_project(enable: &str) -> Run<strata::provision::Rendered> {
        support::init_tracing();
        let tmp = project();
        let plugins = DirPluginSource::for_project(tmp.path()).load().unwrap();
        let compiled = compile_yaml(&format!("{CLUSTER}{enable}"), plugins);
        Run::new(compiled)
            .render(&SkeletonRenderer, &BuildInfo::new("1.0.0", None))
            .unwrap()
    }

    #[test]
    fn later_plugin_wins_a_resource_collision_with_a_warning() {
        let run = render_project(ENABLE_BOTH);
        let first = run
            .rendered()
            .stack(&StackName::new("first").unwrap())
            .unwrap();
        let resources = &json(&first.template)["Resources"];

        assert_eq!(resources["Shared"]["Type"], "AWS::SNS::Subscription");
        assert_eq!(resources["Shared"]["Properties"]["Region"], "us-west-1");
        assert_eq!(resources["AlphaQueue"]["Type"], "AWS::SQS::Queue");

        let collisions: Vec<&str> = run
            .diagnostics()
            .warnings()
            .iter()
            .filter(|w| w.kind == WarningKind::ResourceCollision)
            .map(|w| w.message.as_str())
            .collect();
        assert_eq!(collisions.len(), 2);
        assert!(collisions[0].contains("\"beta\" overwrites resource \"Shared\" from plugin \"alpha\""));
    }

    #[test]
    fn contributions_stay_off_other_stack_kinds() {
        let run = render_project(ENABLE_BOTH);
        let etcd = run.rendered().stack(&StackName::etcd()).unwrap();
        assert!(json(&etcd.template)["Resources"].get("Shared").is_none());
    }

    #[test]
    fn disabled_plugins_contribute_nothing() {
        let run = render_project("plugins:\n  beta:\n    enabled: true\n  alpha:\n    enabled: false\n");
        let first = run
            .rendered()
            .stack(&StackName::new("first").unwrap())
            .unwrap();
        let resources = &json(&first.template)["Resources"];
        assert!(resources.get("AlphaQueue").is_none());
        assert_eq!(resources["Shared"]["Type"], "AWS::SNS::Subscription");
        assert!(!run.diagnostics().has_warnings());
    }

    #[test]
    fn unknown_plugin_settings_warn() {
        let run = render_project("plugins:\n  ghost:\n    enabled: true\n");
        let warnings = run.diagnostics().warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnknownPlugin);
        assert!(warnings[0].message.contains("ghost"));
    }

    #[test]
    fn node_labels_from_every_plugin_are_kept() {
        let tmp = project();
        let plugins = DirPluginSource::for_project(tmp.path()).load().unwrap();
        let compiled = compile_yaml(&format!("{CLUSTER}{ENABLE_BOTH}"), plugins);
        let config = Value::from_json(&serde_json::to_value(&compiled.config).unwrap());

        let mut diagnostics = Diagnostics::default();
        let enabled =
            enabled_plugins(&compiled.plugins, &compiled.config.plugins, &mut diagnostics).unwrap();
        let extras = merge_node_role(NodeRole::Worker, &enabled, &config).unwrap();

        assert_eq!(extras.node_labels["alpha"], "yes");
        assert_eq!(extras.node_labels["tier"], "platinum");
        assert_eq!(extras.files.len(), 1);

        let controller = merge_node_role(NodeRole::Controller, &enabled, &config).unwrap();
        assert!(controller.is_empty());
    }

    #[test]
    fn plugin_files_land_in_worker_userdata() {
        let run = render_project(ENABLE_BOTH);
        let first = StackName::new("first").unwrap();
        let asset = run
            .rendered()
            .assets
            .for_stack(&first)
            .find(|a| a.id.file == "userdata-worker.yaml")
            .unwrap();
        assert!(asset.content.contains("/etc/alpha.conf"));
        assert!(!asset.secret);
    }

    #[test]
    fn render_failure_names_the_plugin() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(
            tmp.path(),
            "gamma",
            "metadata:\n  name: gamma\nspec:\n  cluster:\n    stacks:\n      root:\n        resources:\n          append:\n            inline: '{\"X\": \"{{ .values.missing }}\"}'\n",
        );
        let plugins = DirPluginSource::for_project(tmp.path()).load().unwrap();
        let compiled = compile_yaml(
            &format!("{CLUSTER}plugins:\n  gamma:\n    enabled: true\n"),
            plugins,
        );

        let err = Run::new(compiled)
            .render(&SkeletonRenderer, &BuildInfo::new("1.0.0", None))
            .unwrap_err();

        assert!(err.to_string().contains("plugin gamma"));
        assert!(matches!(
            err,
            strata::provision::ProvisionError::Render {
                source: RenderError::Plugin(PluginError::Render { .. })
            }
        ));
    }
}
