// ABOUTME: Unknown-key validation over the raw YAML tree of a cluster spec.
// ABOUTME: Each config struct declares its allow-list; extra keys fail with their dotted path.

use serde_yaml::Value;

use super::error::{ConfigError, Result};

/// Join a child key onto a dotted path.
pub fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Path of the `index`th element of the sequence at `path`.
pub fn index(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

/// Keys of a mapping node that are not in `known`, in document order.
///
/// Non-mapping nodes have no keys and therefore no unknown keys; their shape is
/// checked when the node is deserialized.
pub fn unknown_keys(node: &Value, known: &[&str]) -> Vec<String> {
    let Value::Mapping(mapping) = node else {
        return Vec::new();
    };

    mapping
        .keys()
        .map(|key| match key {
            Value::String(s) => s.clone(),
            other => serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        })
        .filter(|key| !known.contains(&key.as_str()))
        .collect()
}

/// Fail if `node` has keys outside of `known`.
pub fn ensure_known(node: &Value, path: &str, known: &[&str]) -> Result<()> {
    let keys = unknown_keys(node, known);
    if keys.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::UnknownKeys {
            path: path.to_string(),
            keys,
        })
    }
}

/// Child node of a mapping, if present.
pub fn child<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    node.as_mapping().and_then(|m| m.get(key))
}

/// Validate an optional nested mapping found under `key`.
pub fn ensure_child_known(node: &Value, path: &str, key: &str, known: &[&str]) -> Result<()> {
    match child(node, key) {
        Some(value) => ensure_known(value, &join(path, key), known),
        None => Ok(()),
    }
}

/// Validate every element of the sequence under `key` against the same allow-list.
pub fn ensure_each_known(node: &Value, path: &str, key: &str, known: &[&str]) -> Result<()> {
    for (i, item) in sequence(node, key).iter().enumerate() {
        ensure_known(item, &index(&join(path, key), i), known)?;
    }
    Ok(())
}

/// Elements of the sequence under `key`, or nothing if it is absent or not a sequence.
pub fn sequence<'a>(node: &'a Value, key: &str) -> &'a [Value] {
    child(node, key)
        .and_then(Value::as_sequence)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
