//! Plugin manifests (`plugin.yaml`).
//!
//! Every managed plugin directory carries a manifest:
//!
//! ```yaml
//! name: collections
//! version: 1.0.0
//! description: Sequence transformations
//! aro-version: ">=0.1"
//! provides:
//!   - type: rust-plugin
//!     path: .
//!     handler: collections
//!     build:
//!       output: target/release/libcollections.so
//!   - type: aro-files
//!     path: features/
//! dependencies:
//!   strings:
//!     git: https://example.com/strings.git
//!     ref: v1
//! ```
//!
//! Unknown provide types parse fine and are skipped with a warning at load
//! time, so newer manifests stay loadable by older runtimes.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PluginError, PluginResult};

/// A parsed `plugin.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    /// Version constraint on the hosting runtime.
    #[serde(default, rename = "aro-version")]
    pub aro_version: Option<String>,
    #[serde(default)]
    pub source: Option<SourceOrigin>,
    pub provides: Vec<ProvideEntry>,
    #[serde(default)]
    pub dependencies: HashMap<String, DependencySpec>,
}

impl PluginManifest {
    /// Loads and parses the manifest at `path`.
    pub fn load(path: &Path) -> PluginResult<Self> {
        if !path.exists() {
            return Err(PluginError::ManifestNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content).map_err(|source| PluginError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses manifest YAML.
    pub fn parse(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// One unit the plugin contributes.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvideEntry {
    #[serde(rename = "type")]
    pub kind: ProvideKind,
    pub path: String,
    /// Qualifier/action namespace for this entry.
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default)]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub python: Option<PythonConfig>,
}

/// The recognized provide flavors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ProvideKind {
    AroFiles,
    SwiftPlugin,
    RustPlugin,
    CPlugin,
    CppPlugin,
    PythonPlugin,
    /// Preserved verbatim so diagnostics can name it.
    Unknown(String),
}

impl From<String> for ProvideKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "aro-files" => ProvideKind::AroFiles,
            "swift-plugin" => ProvideKind::SwiftPlugin,
            "rust-plugin" => ProvideKind::RustPlugin,
            "c-plugin" => ProvideKind::CPlugin,
            "cpp-plugin" => ProvideKind::CppPlugin,
            "python-plugin" => ProvideKind::PythonPlugin,
            _ => ProvideKind::Unknown(value),
        }
    }
}

impl ProvideKind {
    /// Whether this flavor loads through the native (C-ABI) host.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            ProvideKind::SwiftPlugin
                | ProvideKind::RustPlugin
                | ProvideKind::CPlugin
                | ProvideKind::CppPlugin
        )
    }
}

/// Build instructions for a native provide entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub compiler: Option<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Prebuilt (or expected) library path, relative to the plugin
    /// directory.
    #[serde(default)]
    pub output: Option<String>,
}

/// Interpreter requirements for a python provide entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PythonConfig {
    #[serde(default, rename = "min-version")]
    pub min_version: Option<String>,
    /// Requirements file, relative to the plugin directory.
    #[serde(default)]
    pub requirements: Option<String>,
}

/// Where a managed plugin came from.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceOrigin {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

/// A plugin-to-plugin dependency.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependencySpec {
    #[serde(default)]
    pub git: Option<String>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_manifest_parses() {
        let manifest = PluginManifest::parse(
            r#"
name: collections
version: 1.2.0
description: Sequence transformations
author: Example
license: MIT
aro-version: ">=0.1"
source:
  url: https://example.com/collections.git
  ref: main
  commit: abc123
provides:
  - type: rust-plugin
    path: .
    handler: collections
    build:
      output: target/release/libcollections.so
  - type: aro-files
    path: features/
  - type: python-plugin
    path: py/
    python:
      min-version: "3.10"
      requirements: requirements.txt
dependencies:
  strings:
    git: https://example.com/strings.git
    ref: v1
"#,
        )
        .unwrap();

        assert_eq!(manifest.name, "collections");
        assert_eq!(manifest.provides.len(), 3);
        assert_eq!(manifest.provides[0].kind, ProvideKind::RustPlugin);
        assert_eq!(manifest.provides[0].handler.as_deref(), Some("collections"));
        assert_eq!(
            manifest.provides[0].build.as_ref().unwrap().output.as_deref(),
            Some("target/release/libcollections.so")
        );
        assert_eq!(manifest.provides[1].kind, ProvideKind::AroFiles);
        assert_eq!(
            manifest.provides[2].python.as_ref().unwrap().min_version.as_deref(),
            Some("3.10")
        );
        assert_eq!(
            manifest.dependencies["strings"].reference.as_deref(),
            Some("v1")
        );
    }

    #[test]
    fn minimal_manifest_parses() {
        let manifest = PluginManifest::parse(
            "name: tiny\nversion: 0.1.0\nprovides:\n  - type: aro-files\n    path: .\n",
        )
        .unwrap();
        assert_eq!(manifest.name, "tiny");
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn unknown_provide_kind_is_preserved() {
        let manifest = PluginManifest::parse(
            "name: odd\nversion: 0.1.0\nprovides:\n  - type: wasm-plugin\n    path: .\n",
        )
        .unwrap();
        assert_eq!(
            manifest.provides[0].kind,
            ProvideKind::Unknown("wasm-plugin".to_string())
        );
        assert!(!manifest.provides[0].kind.is_native());
    }

    #[test]
    fn missing_required_keys_fail() {
        assert!(PluginManifest::parse("name: x\n").is_err());
    }
}
