// ABOUTME: Generates the root template nesting every child stack, and applies plugin resources.
// ABOUTME: Nested stack DependsOn edges encode the hierarchy plus rollout ordering.

use serde_json::{Map, Value as Json, json};

use super::{RenderError, Result, StackDescriptor};
use crate::assets::AssetLocation;
use crate::build_info::BuildInfo;
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::plugin::ResourceMap;
use crate::types::NodeRole;

pub const NESTED_STACK_TYPE: &str = "AWS::CloudFormation::Stack";
const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

fn tags(stack: &StackDescriptor) -> Json {
    Json::Array(
        stack
            .tags
            .iter()
            .map(|(k, v)| json!({ "Key": k, "Value": v }))
            .collect(),
    )
}

/// The root template: one nested stack per child, then root plugin resources.
pub fn root_template(
    config: &Config,
    build: &BuildInfo,
    children: &[(StackDescriptor, AssetLocation)],
) -> Result<Json> {
    let mut resources = Map::new();
    for (stack, location) in children {
        let logical_id = stack.logical_id();
        if resources.contains_key(&logical_id) {
            return Err(RenderError::DuplicateLogicalId {
                stack: stack.name.clone(),
                logical_id,
            });
        }
        let mut resource = Map::new();
        resource.insert("Type".into(), json!(NESTED_STACK_TYPE));
        if !stack.depends_on.is_empty() {
            let depends: Vec<String> = stack.depends_on.iter().map(|d| d.logical_id()).collect();
            resource.insert("DependsOn".into(), json!(depends));
        }
        resource.insert(
            "Properties".into(),
            json!({
                "TemplateURL": location.url,
                "Tags": tags(stack),
            }),
        );
        resources.insert(logical_id, Json::Object(resource));
    }

    Ok(json!({
        "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
        "Description": format!("strata {build} cluster {}", config.cluster_name),
        "Metadata": { "strata": build },
        "Resources": resources,
    }))
}

/// Merge plugin resources into a template's `Resources`, warning when a plugin replaces one.
pub fn apply_resources(
    template: &mut Map<String, Json>,
    stack: &str,
    plugin_resources: ResourceMap,
    diagnostics: &mut Diagnostics,
) {
    let resources = template
        .entry("Resources")
        .or_insert_with(|| Json::Object(Map::new()));
    if !resources.is_object() {
        *resources = Json::Object(Map::new());
    }
    let Json::Object(resources) = resources else {
        return;
    };

    for (key, value) in plugin_resources {
        if resources.insert(key.clone(), value).is_some() {
            diagnostics.warn(Warning::resource_collision(stack, &key, "template", "plugins"));
        }
    }
}

/// Policy resource granting the plugin-contributed statements to a role's IAM role.
pub fn plugin_policy(stack: &StackDescriptor, role: NodeRole, statements: &[Json]) -> (String, Json) {
    let logical_id = format!("{}PluginPolicy", stack.logical_id());
    let resource = json!({
        "Type": "AWS::IAM::Policy",
        "Properties": {
            "PolicyName": format!("{}-{}-plugins", stack.name, role.key()),
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": statements,
            },
            "Roles": [{ "Ref": "IAMRole" }],
        },
    });
    (logical_id, resource)
}

/// TemplateURL of a nested stack in a root template.
pub fn template_url<'a>(template: &'a Json, logical_id: &str) -> Option<&'a str> {
    template
        .get("Resources")?
        .get(logical_id)?
        .get("Properties")?
        .get("TemplateURL")?
        .as_str()
}

/// Point a nested stack at a different TemplateURL; false if the stack is absent.
pub fn set_template_url(template: &mut Json, logical_id: &str, url: &str) -> bool {
    match template
        .get_mut("Resources")
        .and_then(|r| r.get_mut(logical_id))
        .and_then(|r| r.get_mut("Properties"))
        .and_then(Json::as_object_mut)
    {
        Some(properties) => {
            properties.insert("TemplateURL".into(), json!(url));
            true
        }
        None => false,
    }
}
