// ABOUTME: Tagged value tree for plugin values, overrides and structured contributions.
// ABOUTME: Supports key-by-key override merging, path lookup and recursive template rendering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::template::{TemplateError, render_template};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Map(BTreeMap::new())
    }
}

/// Override whose type does not match the plugin-declared default.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("type mismatch at {path}: default is {expected}, override is {found}")]
pub struct MergeError {
    pub path: String,
    pub expected: &'static str,
    pub found: &'static str,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Overlay `overrides` onto `self`, recursing into maps.
    ///
    /// Override keys win; a null on either side yields the other side; lists
    /// are replaced whole.
    pub fn overlay(&self, overrides: &Value, path: &str) -> Result<Value, MergeError> {
        match (self, overrides) {
            (_, Value::Null) => Ok(self.clone()),
            (Value::Null, _) => Ok(overrides.clone()),
            (Value::Map(defaults), Value::Map(over)) => {
                let mut merged = defaults.clone();
                for (key, value) in over {
                    let child_path = format!("{path}.{key}");
                    let entry = match defaults.get(key) {
                        Some(default) => default.overlay(value, &child_path)?,
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), entry);
                }
                Ok(Value::Map(merged))
            }
            (d, o) if d.type_name() == o.type_name() => Ok(o.clone()),
            (d, o) => Err(MergeError {
                path: path.to_string(),
                expected: d.type_name(),
                found: o.type_name(),
            }),
        }
    }

    /// Follow a path of map keys.
    pub fn lookup<'a, I, S>(&self, path: I) -> Option<&Value>
    where
        I: IntoIterator<Item = &'a S>,
        S: AsRef<str> + 'a + ?Sized,
    {
        let mut current = self;
        for key in path {
            match current {
                Value::Map(map) => current = map.get(key.as_ref())?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Render every string in the tree as a template against `context`.
    pub fn render(&self, context: &Value) -> Result<Value, TemplateError> {
        Ok(match self {
            Value::String(s) => Value::String(render_template(s, context)?),
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|item| item.render(context))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| v.render(context).map(|v| (k.clone(), v)))
                    .collect::<Result<_, _>>()?,
            ),
            scalar => scalar.clone(),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.clone()),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Strings print raw; everything else prints as compact JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn parses_all_variants() {
        let v = yaml("a: 1\nb: true\nc: text\nd: [1, 2]\ne: null\nf: {g: 1.5}\n");
        assert_eq!(v.lookup(["a"]).unwrap().type_name(), "number");
        assert_eq!(v.lookup(["b"]), Some(&Value::Bool(true)));
        assert_eq!(v.lookup(["c"]).unwrap().as_str(), Some("text"));
        assert_eq!(v.lookup(["d"]).unwrap().type_name(), "list");
        assert_eq!(v.lookup(["e"]), Some(&Value::Null));
        assert_eq!(v.lookup(["f", "g"]).unwrap().to_string(), "1.5");
    }

    #[test]
    fn overlay_recurses_into_maps() {
        let defaults = yaml("image: {repo: quay.io/x, tag: v1}\nreplicas: 1\n");
        let overrides = yaml("image: {tag: v2}\nextra: yes\n");
        let merged = defaults.overlay(&overrides, "values").unwrap();
        assert_eq!(merged.lookup(["image", "repo"]).unwrap().as_str(), Some("quay.io/x"));
        assert_eq!(merged.lookup(["image", "tag"]).unwrap().as_str(), Some("v2"));
        assert_eq!(merged.lookup(["replicas"]).unwrap().to_string(), "1");
        assert!(merged.lookup(["extra"]).is_some());
    }

    #[test]
    fn overlay_rejects_type_mismatch() {
        let defaults = yaml("image: {tag: v1}\n");
        let overrides = yaml("image: v2\n");
        let err = defaults.overlay(&overrides, "values").unwrap_err();
        assert_eq!(err.path, "values.image");
        assert_eq!(err.expected, "map");
        assert_eq!(err.found, "string");
    }

    #[test]
    fn render_walks_nested_strings() {
        let context = yaml("values: {zone: us-west-1a}\n");
        let tree = yaml("labels: {zone: '{{ .values.zone }}', static: plain}\ncount: 3\n");
        let rendered = tree.render(&context).unwrap();
        assert_eq!(
            rendered.lookup(["labels", "zone"]).unwrap().as_str(),
            Some("us-west-1a")
        );
        assert_eq!(rendered.lookup(["labels", "static"]).unwrap().as_str(), Some("plain"));
        assert_eq!(rendered.lookup(["count"]).unwrap().to_string(), "3");
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let v = yaml("a: [1, {b: x}]\n");
        assert_eq!(Value::from_json(&v.to_json()), v);
    }
}
