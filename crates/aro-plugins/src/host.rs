//! Provider assembly.
//!
//! Turns the discovery results of an application directory into
//! driver-attachable [`PluginProvider`]s, dispatching each provide entry by
//! flavor: `aro-files` to the declarative loader, the four native flavors
//! to the C-ABI host, `python-plugin` to the scripted host. Unknown
//! flavors are skipped with a warning.

use std::path::Path;
use std::time::Duration;

use tracing::warn;

use aro_core::diagnostics::Diagnostic;
use aro_runtime::driver::PluginProvider;

use crate::declarative::DeclarativePlugin;
use crate::discovery::{self, DiscoveredPlugin};
use crate::manifest::ProvideKind;
use crate::native::NativePluginHost;
use crate::scripted::PythonPluginHost;

/// Providers plus the diagnostics discovery produced.
pub struct AssembledPlugins {
    pub providers: Vec<Box<dyn PluginProvider>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Discovers every plugin of an application directory and builds its
/// providers, in deterministic (sorted) order, with the default 30s
/// subprocess deadline.
pub fn assemble(application_dir: &Path) -> AssembledPlugins {
    assemble_with(application_dir, Duration::from_secs(30))
}

/// Like [`assemble`], with an explicit per-call deadline for subprocess
/// plugin calls (`runtime.call_timeout_secs` in `aro.yaml`).
pub fn assemble_with(application_dir: &Path, call_timeout: Duration) -> AssembledPlugins {
    let discovery = discovery::discover(application_dir);
    let mut providers: Vec<Box<dyn PluginProvider>> = Vec::new();
    let mut diagnostics = discovery.diagnostics;

    for plugin in discovery.managed {
        providers_for_plugin(&plugin, call_timeout, &mut providers, &mut diagnostics);
    }
    for file in discovery.aro_files {
        providers.push(Box::new(DeclarativePlugin::from_file(file.name, file.path)));
    }

    AssembledPlugins {
        providers,
        diagnostics,
    }
}

fn providers_for_plugin(
    plugin: &DiscoveredPlugin,
    call_timeout: Duration,
    providers: &mut Vec<Box<dyn PluginProvider>>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let name = &plugin.manifest.name;
    for entry in &plugin.manifest.provides {
        match &entry.kind {
            ProvideKind::AroFiles => {
                let dir = plugin.directory.join(entry.path.trim_start_matches("./"));
                let dir = if dir.is_dir() {
                    dir
                } else {
                    plugin.directory.clone()
                };
                providers.push(Box::new(DeclarativePlugin::from_directory(
                    name.clone(),
                    &dir,
                )));
            }
            kind if kind.is_native() => {
                providers.push(Box::new(NativePluginHost::new(
                    name.clone(),
                    plugin.directory.clone(),
                    entry.clone(),
                )));
            }
            ProvideKind::PythonPlugin => {
                providers.push(Box::new(
                    PythonPluginHost::new(name.clone(), plugin.directory.clone(), entry.clone())
                        .with_timeout(call_timeout),
                ));
            }
            ProvideKind::Unknown(kind) => {
                warn!(plugin = %name, %kind, "Unknown provide type; entry skipped");
                diagnostics.push(Diagnostic::warning(format!(
                    "plugin '{name}' provides unknown type '{kind}'; entry skipped"
                )));
            }
            _ => unreachable!("all provide kinds are covered"),
        }
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
    fn assembles_providers_by_flavor() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("Plugins/mixed/plugin.yaml"),
            r#"
name: mixed
version: 1.0.0
provides:
  - type: aro-files
    path: features/
  - type: rust-plugin
    path: .
  - type: python-plugin
    path: py/
  - type: wasm-plugin
    path: .
"#,
        );
        write(&dir.path().join("plugins/solo.aro"), "(a: B) { }");

        let assembled = assemble(dir.path());
        let names: Vec<&str> = assembled.providers.iter().map(|p| p.name()).collect();
        // Three recognized entries from the managed plugin, one single-file
        // declarative plugin.
        assert_eq!(names, ["mixed", "mixed", "mixed", "solo"]);
        assert_eq!(assembled.diagnostics.len(), 1);
        assert!(assembled.diagnostics[0].message.contains("wasm-plugin"));
    }
}
