// ABOUTME: Diagnostics accumulator for non-fatal warnings during compile, merge and provisioning.
// ABOUTME: Collects warnings that shouldn't fail an operation but should be shown to users.

/// Collects non-fatal warnings during an operation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Two plugins contributed the same resource key to one stack.
    pub fn resource_collision(
        stack: &str,
        key: &str,
        earlier: &str,
        later: &str,
    ) -> Self {
        Self {
            kind: WarningKind::ResourceCollision,
            message: format!(
                "plugin \"{later}\" overwrites resource \"{key}\" from plugin \"{earlier}\" in stack {stack}"
            ),
        }
    }

    /// Secret-bearing content written without a KMS key configured.
    pub fn unencrypted_secrets(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::UnencryptedSecrets,
            message: message.into(),
        }
    }

    /// A cluster plugin entry names a plugin that was not loaded.
    pub fn unknown_plugin(settings_key: &str) -> Self {
        Self {
            kind: WarningKind::UnknownPlugin,
            message: format!("plugins.{settings_key} does not match any loaded plugin"),
        }
    }
}

/// Categories of non-fatal warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Later plugin replaced an earlier plugin's resource.
    ResourceCollision,
    /// Export wrote secret-bearing assets without kmsKeyArn.
    UnencryptedSecrets,
    /// Plugin config without a matching plugin.
    UnknownPlugin,
}
