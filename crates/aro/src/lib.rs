//! # ARO
//!
//! A declarative language whose statements read like constrained English:
//!
//! ```text
//! (Application-Start: Hello) {
//!     Log "Hello from ARO!" to the <console>.
//!     Return an <OK: status> for the <startup>.
//! }
//! ```
//!
//! Every statement is `<Action> the <result: qualifier> preposition the
//! <object: qualifier>.` — feature sets bundle statements into business
//! capabilities, events and repositories connect them, and plugins written
//! in several host languages extend the verb and qualifier vocabulary.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ aro-compiler │──▶│  aro-runtime │◀──│ aro-plugins  │   │   aro-core   │
//! │ lex · parse  │   │ run · events │   │ C ABI · py   │   │ shared model │
//! │ analyze·merge│   │ repos · drive│   │ · .aro files │   │ (everyone's) │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use aro::Application;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let app = Application::load(std::path::Path::new("my-app"))?;
//!     std::process::exit(app.run().await?);
//! }
//! ```

pub mod application;

pub use application::{Application, CompileFailure};

// The layer crates, re-exported whole for direct access.
pub use aro_compiler as compiler;
pub use aro_core as core;
pub use aro_plugins as plugins;
pub use aro_runtime as runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::application::Application;
    pub use aro_compiler::{compile_source, merge, parse};
    pub use aro_core::{
        Diagnostic, FeatureSet, FeatureSetKind, Program, RuntimeError, RuntimeValue, Statement,
    };
    pub use aro_runtime::{
        ActionOutcome, ApplicationDriver, ExecutionContext, FeatureSetRunner, PluginProvider,
        RuntimeServices,
    };
    pub use tracing::{debug, error, info, trace, warn};
}
