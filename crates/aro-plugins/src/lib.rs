//! # ARO Plugins
//!
//! The multi-language plugin subsystem: discovery, manifests, and three
//! host flavors behind the runtime's `PluginProvider` seam.
//!
//! ```text
//! Plugins/<dir>/plugin.yaml ─▶ discovery ─▶ assemble ─┬▶ DeclarativePlugin  (.aro files)
//! plugins/<file>.aro ─────────────────────────────────┼▶ NativePluginHost   (C ABI, libloading)
//!                                                     └▶ PythonPluginHost   (subprocess)
//! ```
//!
//! - **Declarative** plugins contribute feature sets compiled from ARO
//!   source, namespaced `<plugin>:<feature-set>`.
//! - **Native** plugins are shared libraries speaking the
//!   `aro_plugin_execute` / `aro_plugin_free` C ABI, built on demand by
//!   the compiler driver when no prebuilt artifact exists.
//! - **Scripted** plugins run in fresh interpreter subprocesses per call,
//!   with base64-JSON argv transport.
//!
//! All hosts register verbs and qualifiers into the runtime's registries
//! at load time and remove exactly those registrations on unload, so a
//! load/list/unload cycle leaves the registries identical.

pub mod compile;
pub mod declarative;
pub mod discovery;
pub mod error;
pub mod host;
pub mod manifest;
pub mod native;
pub mod scripted;

// Re-exports
pub use compile::{PluginFlavor, build_plugin, detect_flavor, library_extension};
pub use declarative::DeclarativePlugin;
pub use discovery::{DiscoveredAroFile, DiscoveredPlugin, Discovery, discover};
pub use error::{PluginError, PluginResult};
pub use host::{AssembledPlugins, assemble, assemble_with};
pub use manifest::{
    BuildConfig, DependencySpec, PluginManifest, ProvideEntry, ProvideKind, PythonConfig,
    SourceOrigin,
};
pub use native::{NativeLibrary, NativePluginHost, PluginInfo};
pub use scripted::{PythonPluginHost, find_interpreter};
