// ABOUTME: Error types for cluster spec parsing, unknown keys and invariant violations.
// ABOUTME: Every variant carries the dotted key path so users can find the offending field.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse cluster spec: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown keys found{}: {}", in_path(.path), .keys.join(", "))]
    UnknownKeys { path: String, keys: Vec<String> },

    #[error("invalid {path}: {message}")]
    Invalid { path: String, message: String },

    #[error("cluster spec not found in {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Dotted key path the error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            ConfigError::UnknownKeys { path, .. } | ConfigError::Invalid { path, .. } => {
                Some(path)
            }
            _ => None,
        }
    }
}

fn in_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" in {path}")
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
