//! # ARO Runtime
//!
//! The asynchronous, event-driven evaluator for compiled ARO programs.
//!
//! ## Architecture
//!
//! Everything flows through one service bundle and one event queue:
//!
//! ```text
//! ┌──────────────┐    run     ┌──────────────────┐   lookup   ┌──────────────┐
//! │ Application  │───────────▶│ FeatureSetRunner │───────────▶│   Action /   │
//! │   Driver     │            │  (one per task)  │            │  Qualifier   │
//! └──────┬───────┘            └───────┬──────────┘            │  registries  │
//!        │ spawn                      │ emit                  └──────────────┘
//!        ▼                            ▼
//! ┌──────────────┐  dispatch  ┌──────────────────┐  observe   ┌──────────────┐
//! │    Event     │◀───────────│    Event bus     │◀───────────│  Repository  │
//! │  Scheduler   │            │   (MPSC queue)   │            │    store     │
//! └──────────────┘            └──────────────────┘            └──────────────┘
//! ```
//!
//! - **Scheduling**: user code runs on cooperative tasks; statements within
//!   an activation execute in strict textual order, activations interleave
//!   only at suspension points.
//! - **Dispatch**: verbs and qualifiers are resolved through read-mostly
//!   registries that plugins extend at load time.
//! - **Events**: a single MPSC queue; handlers of an earlier event are
//!   always scheduled before handlers of a later one.
//! - **Shutdown**: signal, fatal error, or explicit request; the queue
//!   drains within a grace window, then outstanding activations are
//!   cancelled at their next suspension point.

pub mod actions;
pub mod builtin;
pub mod config;
pub mod context;
pub mod driver;
pub mod events;
pub mod expr;
pub mod logging;
pub mod qualifiers;
pub mod repository;
pub mod runner;
pub mod services;
pub mod shutdown;
pub mod transforms;

// Re-exports
pub use actions::{
    ActionHandler, ActionInvocation, ActionOutcome, ActionRegistration, ActionRegistry, handler,
};
pub use config::{AroConfig, ConfigError, ConfigLoader, ConfigResult, load_config};
pub use context::{EXPRESSION_SLOT, ExecutionContext, GlobalStore, WITH_SLOT};
pub use driver::{ApplicationDriver, PluginContribution, PluginProvider};
pub use events::{EventBus, EventScheduler, HANDLER_ERROR_EVENT, SHUTDOWN_EVENT};
pub use logging::LoggingBuilder;
pub use qualifiers::{
    QualifierHandler, QualifierRegistration, QualifierRegistry, qualifier_handler,
};
pub use repository::RepositoryStore;
pub use runner::FeatureSetRunner;
pub use services::RuntimeServices;
pub use shutdown::{ShutdownController, ShutdownReason};

// Re-export tracing for use by other crates
pub use tracing;
