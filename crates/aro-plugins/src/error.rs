//! Plugin subsystem error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while discovering, loading, building, or calling
/// plugins.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The manifest file could not be read.
    #[error("plugin manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    /// The manifest failed to parse.
    #[error("failed to parse plugin manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// No loadable library was found and none could be built.
    #[error("plugin '{plugin}' has no loadable library (searched {searched:?})")]
    LibraryNotFound {
        plugin: String,
        searched: Vec<PathBuf>,
    },

    /// The dynamic loader rejected the library.
    #[error("plugin '{plugin}' could not be opened: {message}")]
    LibraryOpen { plugin: String, message: String },

    /// A required C-ABI entry point is absent.
    #[error("plugin '{plugin}' is missing the required symbol '{symbol}'")]
    MissingSymbol { plugin: String, symbol: String },

    /// A plugin call failed.
    #[error("plugin '{plugin}' call failed: {message}")]
    Execute { plugin: String, message: String },

    /// The plugin returned malformed JSON or an unexpected shape.
    #[error("plugin '{plugin}' protocol violation: {message}")]
    Protocol { plugin: String, message: String },

    /// No usable interpreter was found for a scripted plugin.
    #[error("plugin '{plugin}' needs an interpreter, but none was found")]
    InterpreterNotFound { plugin: String },

    /// The plugin's main source file could not be located.
    #[error("plugin '{plugin}' has no main source file under {dir}")]
    MainFileNotFound { plugin: String, dir: PathBuf },

    /// Building the plugin from source failed.
    #[error("plugin '{plugin}' failed to build:\n{stderr}")]
    Compilation { plugin: String, stderr: String },

    /// A per-call deadline elapsed.
    #[error("plugin '{plugin}' call exceeded {secs}s")]
    Timeout { plugin: String, secs: u64 },

    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
