//! Plugin discovery.
//!
//! An application directory may carry two plugin locations:
//!
//! - `Plugins/` — managed plugins, one sub-directory each, with a
//!   `plugin.yaml` manifest.
//! - `plugins/` — single-file declarative plugins: bare `.aro` files whose
//!   stem becomes the plugin name.
//!
//! A broken manifest is reported with the plugin's origin and does not
//! abort discovery of the others.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use aro_core::diagnostics::Diagnostic;

use crate::manifest::PluginManifest;

/// One managed plugin found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub directory: PathBuf,
    pub manifest: PluginManifest,
}

/// A single-file declarative plugin found under `plugins/`.
#[derive(Debug, Clone)]
pub struct DiscoveredAroFile {
    /// Plugin name (the file stem).
    pub name: String,
    pub path: PathBuf,
}

/// Everything discovery found.
#[derive(Debug, Default)]
pub struct Discovery {
    pub managed: Vec<DiscoveredPlugin>,
    pub aro_files: Vec<DiscoveredAroFile>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Scans an application directory for plugins.
pub fn discover(application_dir: &Path) -> Discovery {
    let mut discovery = Discovery::default();
    discover_managed(&application_dir.join("Plugins"), &mut discovery);
    discover_aro_files(&application_dir.join("plugins"), &mut discovery);
    discovery
}

fn discover_managed(root: &Path, discovery: &mut Discovery) {
    let Ok(entries) = std::fs::read_dir(root) else {
        debug!(dir = %root.display(), "No managed plugin directory");
        return;
    };
    let mut directories: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    directories.sort();

    for directory in directories {
        let manifest_path = directory.join("plugin.yaml");
        match PluginManifest::load(&manifest_path) {
            Ok(manifest) => {
                debug!(plugin = %manifest.name, dir = %directory.display(), "Plugin discovered");
                discovery.managed.push(DiscoveredPlugin {
                    directory,
                    manifest,
                });
            }
            Err(error) => {
                warn!(dir = %directory.display(), %error, "Plugin manifest rejected");
                discovery.diagnostics.push(
                    Diagnostic::warning(format!("plugin skipped: {error}"))
                        .in_file(manifest_path.display().to_string()),
                );
            }
        }
    }
}

fn discover_aro_files(root: &Path, discovery: &mut Discovery) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "aro"))
        .collect();
    files.sort();

    for path in files {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        discovery.aro_files.push(DiscoveredAroFile {
            name: name.to_string(),
            path,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn finds_managed_and_single_file_plugins() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("Plugins/collections/plugin.yaml"),
            "name: collections\nversion: 1.0.0\nprovides:\n  - type: aro-files\n    path: .\n",
        );
        write(&dir.path().join("plugins/greetings.aro"), "(x: Y) { }");
        write(&dir.path().join("plugins/notes.txt"), "ignored");

        let discovery = discover(dir.path());
        assert_eq!(discovery.managed.len(), 1);
        assert_eq!(discovery.managed[0].manifest.name, "collections");
        assert_eq!(discovery.aro_files.len(), 1);
        assert_eq!(discovery.aro_files[0].name, "greetings");
        assert!(discovery.diagnostics.is_empty());
    }

    #[test]
    fn broken_manifest_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("Plugins/bad/plugin.yaml"), "name: [not\n");
        write(
            &dir.path().join("Plugins/good/plugin.yaml"),
            "name: good\nversion: 1.0.0\nprovides:\n  - type: aro-files\n    path: .\n",
        );

        let discovery = discover(dir.path());
        assert_eq!(discovery.managed.len(), 1);
        assert_eq!(discovery.managed[0].manifest.name, "good");
        assert_eq!(discovery.diagnostics.len(), 1);
    }

    #[test]
    fn empty_application_has_no_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let discovery = discover(dir.path());
        assert!(discovery.managed.is_empty());
        assert!(discovery.aro_files.is_empty());
    }
}
