// ABOUTME: Userdata parts, their content validators and plugin file/unit injection.
// ABOUTME: Cloud-config parts must carry the #cloud-config header and parse as a YAML mapping.

use serde_yaml::{Mapping, Value as Yaml};

use super::{RenderError, Result};
use crate::plugin::NodeRoleExtras;
use crate::types::NodeRole;

pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Check applied to a rendered userdata part before it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartValidator {
    /// Opaque content such as shell scripts.
    NoOp,
    CloudConfig,
}

impl PartValidator {
    pub fn validate(&self, content: &str) -> std::result::Result<(), String> {
        match self {
            PartValidator::NoOp => Ok(()),
            PartValidator::CloudConfig => parse_cloud_config(content).map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserdataPart {
    pub name: String,
    pub content: String,
    pub validator: PartValidator,
}

fn parse_cloud_config(content: &str) -> std::result::Result<Mapping, String> {
    let body = content
        .strip_prefix(CLOUD_CONFIG_HEADER)
        .ok_or_else(|| format!("cloud-config must start with \"{CLOUD_CONFIG_HEADER}\""))?;
    match serde_yaml::from_str::<Yaml>(body).map_err(|e| e.to_string())? {
        Yaml::Null => Ok(Mapping::new()),
        Yaml::Mapping(mapping) => Ok(mapping),
        other => Err(format!(
            "cloud-config body must be a mapping, found {}",
            yaml_type(&other)
        )),
    }
}

fn yaml_type(value: &Yaml) -> &'static str {
    match value {
        Yaml::Null => "null",
        Yaml::Bool(_) => "bool",
        Yaml::Number(_) => "number",
        Yaml::String(_) => "string",
        Yaml::Sequence(_) => "sequence",
        Yaml::Mapping(_) => "mapping",
        Yaml::Tagged(_) => "tagged value",
    }
}

/// Sequence under `key`, created if absent.
fn sequence_entry<'a>(
    mapping: &'a mut Mapping,
    key: &str,
) -> std::result::Result<&'a mut Vec<Yaml>, String> {
    let entry = mapping
        .entry(Yaml::from(key))
        .or_insert_with(|| Yaml::Sequence(Vec::new()));
    if entry.is_null() {
        *entry = Yaml::Sequence(Vec::new());
    }
    entry
        .as_sequence_mut()
        .ok_or_else(|| format!("\"{key}\" must be a sequence"))
}

fn append_extras(content: &str, extras: &NodeRoleExtras) -> std::result::Result<String, String> {
    let mut doc = parse_cloud_config(content)?;

    if !extras.files.is_empty() {
        let files = sequence_entry(&mut doc, "write_files")?;
        for file in &extras.files {
            let mut entry = Mapping::new();
            entry.insert("path".into(), file.path.clone().into());
            if let Some(permissions) = &file.permissions {
                entry.insert("permissions".into(), permissions.clone().into());
            }
            entry.insert("content".into(), file.content.clone().into());
            files.push(Yaml::Mapping(entry));
        }
    }

    if !extras.units.is_empty() {
        let coreos = doc
            .entry(Yaml::from("coreos"))
            .or_insert_with(|| Yaml::Mapping(Mapping::new()));
        if coreos.is_null() {
            *coreos = Yaml::Mapping(Mapping::new());
        }
        let coreos = coreos
            .as_mapping_mut()
            .ok_or_else(|| "\"coreos\" must be a mapping".to_string())?;
        let units = sequence_entry(coreos, "units")?;
        for unit in &extras.units {
            let mut entry = Mapping::new();
            entry.insert("name".into(), unit.name.clone().into());
            entry.insert("content".into(), unit.content.clone().into());
            units.push(Yaml::Mapping(entry));
        }
    }

    let body = serde_yaml::to_string(&doc).map_err(|e| e.to_string())?;
    Ok(format!("{CLOUD_CONFIG_HEADER}\n{body}"))
}

/// Inject plugin files and units into the first cloud-config part, then validate every part.
pub fn finalize(
    role: NodeRole,
    mut parts: Vec<UserdataPart>,
    extras: &NodeRoleExtras,
) -> Result<Vec<UserdataPart>> {
    if !extras.files.is_empty() || !extras.units.is_empty() {
        let Some(part) = parts
            .iter_mut()
            .find(|p| p.validator == PartValidator::CloudConfig)
        else {
            return Err(RenderError::Userdata {
                role,
                part: role.key().to_string(),
                message: "plugins contribute files or units but there is no cloud-config part"
                    .to_string(),
            });
        };
        part.content =
            append_extras(&part.content, extras).map_err(|message| RenderError::Userdata {
                role,
                part: part.name.clone(),
                message,
            })?;
    }

    for part in &parts {
        part.validator
            .validate(&part.content)
            .map_err(|message| RenderError::Userdata {
                role,
                part: part.name.clone(),
                message,
            })?;
    }

    Ok(parts)
}
