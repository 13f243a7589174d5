// ABOUTME: Plugin sources: enumerate plugin declarations available to a run.
// ABOUTME: The directory source reads <root>/<name>/plugin.yaml in name order.

use std::path::{Path, PathBuf};

use super::{Plugin, PluginError, Result};

pub const PLUGIN_MANIFEST: &str = "plugin.yaml";

pub trait PluginSource {
    /// All available plugins, in declaration order.
    fn load(&self) -> Result<Vec<Plugin>>;
}

/// Plugins stored one per subdirectory of `root`.
#[derive(Debug, Clone)]
pub struct DirPluginSource {
    root: PathBuf,
}

impl DirPluginSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The `plugins/` directory beside a cluster spec.
    pub fn for_project(dir: &Path) -> Self {
        Self::new(dir.join("plugins"))
    }

    fn read_err(path: &Path) -> impl FnOnce(std::io::Error) -> PluginError + '_ {
        move |source| PluginError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl PluginSource for DirPluginSource {
    fn load(&self) -> Result<Vec<Plugin>> {
        if !self.root.is_dir() {
            tracing::debug!(root = %self.root.display(), "no plugin directory");
            return Ok(Vec::new());
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .map_err(Self::read_err(&self.root))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()
            .map_err(Self::read_err(&self.root))?;
        dirs.retain(|d| d.join(PLUGIN_MANIFEST).is_file());
        dirs.sort();

        let mut plugins: Vec<Plugin> = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let manifest = dir.join(PLUGIN_MANIFEST);
            let yaml = std::fs::read_to_string(&manifest).map_err(Self::read_err(&manifest))?;
            let plugin = Plugin::from_yaml(&yaml, &dir).map_err(|source| PluginError::Manifest {
                path: manifest.clone(),
                source,
            })?;

            if let Some(other) = plugins
                .iter()
                .find(|p| p.settings_key() == plugin.settings_key())
            {
                return Err(PluginError::DuplicateSettingsKey {
                    plugin: plugin.name().to_string(),
                    other: other.name().to_string(),
                    key: plugin.settings_key().to_string(),
                });
            }

            tracing::debug!(plugin = plugin.name(), dir = %dir.display(), "loaded plugin");
            plugins.push(plugin);
        }

        Ok(plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_plugin(root: &Path, dir: &str, manifest: &str) {
        let dir = root.join(dir);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PLUGIN_MANIFEST), manifest).unwrap();
    }

    #[test]
    fn missing_directory_yields_no_plugins() {
        let tmp = tempfile::tempdir().unwrap();
        let source = DirPluginSource::for_project(tmp.path());
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn loads_in_directory_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "b-second", "metadata:\n  name: second\n");
        write_plugin(tmp.path(), "a-first", "metadata:\n  name: first\n");
        std::fs::create_dir_all(tmp.path().join("not-a-plugin")).unwrap();

        let plugins = DirPluginSource::new(tmp.path()).load().unwrap();
        let names: Vec<&str> = plugins.iter().map(Plugin::name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(plugins[0].dir, tmp.path().join("a-first"));
    }

    #[test]
    fn duplicate_settings_keys_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "a", "metadata:\n  name: a\n  settingsKey: shared\n");
        write_plugin(tmp.path(), "b", "metadata:\n  name: b\n  settingsKey: shared\n");
        let err = DirPluginSource::new(tmp.path()).load().unwrap_err();
        assert!(matches!(err, PluginError::DuplicateSettingsKey { .. }));
    }

    #[test]
    fn malformed_manifest_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_plugin(tmp.path(), "broken", "metadata: [\n");
        let err = DirPluginSource::new(tmp.path()).load().unwrap_err();
        assert!(err.to_string().contains("plugin.yaml"));
    }
}
