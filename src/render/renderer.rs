// ABOUTME: Template renderers producing stack templates and userdata parts from a context.
// ABOUTME: The directory renderer reads templates/<kind>.json and userdata/<role>.{yaml,sh}.

use std::path::{Path, PathBuf};

use super::userdata::{CLOUD_CONFIG_HEADER, PartValidator, UserdataPart};
use super::{RenderError, Result};
use crate::plugin::{Value, render_template};
use crate::types::{NodeRole, StackKind};

pub trait TemplateRenderer: Send + Sync {
    /// Template text for a non-root stack of `kind`.
    fn render_template(&self, kind: StackKind, context: &Value) -> Result<String>;

    /// Userdata parts for machines of `role`, in delivery order.
    fn render_userdata(&self, role: NodeRole, context: &Value) -> Result<Vec<UserdataPart>>;
}

/// Renders template files kept in a project directory.
#[derive(Debug, Clone)]
pub struct TemplateDirRenderer {
    dir: PathBuf,
}

impl TemplateDirRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn template_path(&self, kind: StackKind) -> PathBuf {
        self.dir.join("templates").join(format!("{}.json", kind.key()))
    }

    fn userdata_candidates(&self, role: NodeRole) -> [(PathBuf, PartValidator); 2] {
        let dir = self.dir.join("userdata");
        [
            (dir.join(format!("{}.yaml", role.key())), PartValidator::CloudConfig),
            (dir.join(format!("{}.sh", role.key())), PartValidator::NoOp),
        ]
    }

    fn render_file(path: &Path, context: &Value) -> Result<String> {
        let text = std::fs::read_to_string(path).map_err(|source| RenderError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        render_template(&text, context).map_err(|source| RenderError::Template {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl TemplateRenderer for TemplateDirRenderer {
    fn render_template(&self, kind: StackKind, context: &Value) -> Result<String> {
        let path = self.template_path(kind);
        if !path.is_file() {
            return Err(RenderError::MissingTemplate { path });
        }
        Self::render_file(&path, context)
    }

    fn render_userdata(&self, role: NodeRole, context: &Value) -> Result<Vec<UserdataPart>> {
        let mut parts = Vec::new();
        for (path, validator) in self.userdata_candidates(role) {
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| role.key().to_string());
            parts.push(UserdataPart {
                name,
                content: Self::render_file(&path, context)?,
                validator,
            });
        }
        Ok(parts)
    }
}

/// Emits minimal, valid templates and cloud-configs with no resources of their own.
///
/// Useful when only plugin contributions and the stack graph matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkeletonRenderer;

impl TemplateRenderer for SkeletonRenderer {
    fn render_template(&self, kind: StackKind, _context: &Value) -> Result<String> {
        let template = serde_json::json!({
            "AWSTemplateFormatVersion": "2010-09-09",
            "Description": format!("{kind} stack"),
            "Resources": {},
        });
        Ok(template.to_string())
    }

    fn render_userdata(&self, role: NodeRole, _context: &Value) -> Result<Vec<UserdataPart>> {
        Ok(vec![UserdataPart {
            name: format!("{}.yaml", role.key()),
            content: format!("{CLOUD_CONFIG_HEADER}\nwrite_files: []\n"),
            validator: PartValidator::CloudConfig,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Value {
        serde_yaml::from_str("config: {region: us-west-1}\n").unwrap()
    }

    #[test]
    fn reads_and_renders_template_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("templates")).unwrap();
        std::fs::write(
            tmp.path().join("templates/etcd.json"),
            r#"{"Description": "etcd in {{ .config.region }}"}"#,
        )
        .unwrap();

        let renderer = TemplateDirRenderer::new(tmp.path());
        let text = renderer.render_template(StackKind::Etcd, &context()).unwrap();
        assert_eq!(text, r#"{"Description": "etcd in us-west-1"}"#);
    }

    #[test]
    fn missing_template_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let renderer = TemplateDirRenderer::new(tmp.path());
        assert!(matches!(
            renderer.render_template(StackKind::Network, &context()),
            Err(RenderError::MissingTemplate { path }) if path.ends_with("templates/network.json")
        ));
    }

    #[test]
    fn userdata_parts_pick_validator_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("userdata");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("worker.yaml"), "#cloud-config\nhostname: w\n").unwrap();
        std::fs::write(dir.join("worker.sh"), "#!/bin/sh\necho {{ .config.region }}\n").unwrap();

        let parts = TemplateDirRenderer::new(tmp.path())
            .render_userdata(NodeRole::Worker, &context())
            .unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].validator, PartValidator::CloudConfig);
        assert_eq!(parts[1].validator, PartValidator::NoOp);
        assert!(parts[1].content.contains("echo us-west-1"));
    }

    #[test]
    fn skeleton_output_is_valid() {
        let text = SkeletonRenderer
            .render_template(StackKind::ControlPlane, &context())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed["Resources"].is_object());

        let parts = SkeletonRenderer
            .render_userdata(NodeRole::Etcd, &context())
            .unwrap();
        assert!(PartValidator::CloudConfig.validate(&parts[0].content).is_ok());
    }
}
