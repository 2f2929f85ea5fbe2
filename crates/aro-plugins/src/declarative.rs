//! Declarative plugins: contributions written in ARO itself.
//!
//! `aro-files` provide entries point at `.aro` sources that are parsed and
//! analyzed exactly like user code. Their feature sets join the program
//! pool under `<plugin>:<feature-set>` names (the driver handles the
//! namespacing and short-name aliasing). A file that fails to compile is
//! reported with the plugin's origin and does not abort the other files —
//! or the other plugins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use aro_compiler::compile_source;
use aro_core::diagnostics::{Diagnostic, has_errors};
use aro_runtime::driver::{PluginContribution, PluginProvider};
use aro_runtime::services::RuntimeServices;

/// A plugin whose whole contribution is ARO source files.
pub struct DeclarativePlugin {
    name: String,
    files: Vec<PathBuf>,
}

impl DeclarativePlugin {
    /// A plugin backed by an explicit list of files.
    pub fn new(name: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }

    /// A single-file plugin from `plugins/<name>.aro`.
    pub fn from_file(name: impl Into<String>, path: PathBuf) -> Self {
        Self::new(name, vec![path])
    }

    /// A plugin backed by every `.aro` file directly under `dir`.
    pub fn from_directory(name: impl Into<String>, dir: &Path) -> Self {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "aro"))
            .collect();
        files.sort();
        Self::new(name, files)
    }
}

#[async_trait]
impl PluginProvider for DeclarativePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, _services: &Arc<RuntimeServices>) -> anyhow::Result<PluginContribution> {
        let mut contribution = PluginContribution::default();

        for path in &self.files {
            let origin = format!("{}:{}", self.name, path.display());
            let source = match std::fs::read_to_string(path) {
                Ok(source) => source,
                Err(error) => {
                    contribution.diagnostics.push(
                        Diagnostic::warning(format!("plugin file unreadable: {error}"))
                            .in_file(origin),
                    );
                    continue;
                }
            };

            let (program, diagnostics) = compile_source(&source, Some(&origin));
            if has_errors(&diagnostics) {
                // This file contributes nothing, but the rest still load.
                warn!(plugin = %self.name, file = %path.display(), "Plugin file failed to compile");
                contribution.diagnostics.extend(diagnostics);
                continue;
            }
            contribution.diagnostics.extend(diagnostics);
            debug!(
                plugin = %self.name,
                file = %path.display(),
                feature_sets = program.feature_sets.len(),
                "Plugin file compiled"
            );
            contribution.feature_sets.extend(program.feature_sets);
        }

        Ok(contribution)
    }

    async fn unload(&self, _services: &Arc<RuntimeServices>) {
        // Feature sets live in the program pool for the process lifetime;
        // nothing is registered that could be removed.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn feature_sets_are_contributed() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("greet.aro"),
            r#"(sayHello: Greeting) {
                Log "hello" to the <console>.
            }"#,
        );
        let (services, _rx) = RuntimeServices::create();
        let plugin = DeclarativePlugin::from_directory("greetings", dir.path());
        let contribution = plugin.load(&services).await.unwrap();
        assert_eq!(contribution.feature_sets.len(), 1);
        assert_eq!(contribution.feature_sets[0].feature_set.name, "sayHello");
    }

    #[tokio::test]
    async fn broken_file_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("a_bad.aro"), "(broken no colon) {");
        write(
            &dir.path().join("b_good.aro"),
            r#"(works: Greeting) { Log "ok" to the <console>. }"#,
        );
        let (services, _rx) = RuntimeServices::create();
        let plugin = DeclarativePlugin::from_directory("mixed", dir.path());
        let contribution = plugin.load(&services).await.unwrap();
        assert_eq!(contribution.feature_sets.len(), 1);
        assert_eq!(contribution.feature_sets[0].feature_set.name, "works");
        assert!(!contribution.diagnostics.is_empty());
        // Diagnostics carry the plugin origin.
        assert!(
            contribution.diagnostics[0]
                .origin
                .as_deref()
                .unwrap()
                .starts_with("mixed:")
        );
    }
}
