// ABOUTME: Per-cluster plugin settings keyed by each plugin's settings key.
// ABOUTME: Enablement is evaluated later by the plugin merge engine, not at compile time.

use serde::{Deserialize, Serialize};

use crate::plugin::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub values: Value,
}

impl PluginConfig {
    pub const KEYS: &'static [&'static str] = &["enabled", "values"];
}
