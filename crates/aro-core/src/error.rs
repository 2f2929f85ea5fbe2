//! Runtime error taxonomy.
//!
//! Errors inside a feature-set activation abort only that activation; the
//! variants here map one-to-one onto the failure classes the scheduler and
//! the driver distinguish. `Throw` is not an unwinding exception — it is a
//! value-carrying variant produced by the `throw` action.

use thiserror::Error;

use crate::ast::Span;
use crate::value::RuntimeValue;

/// Errors that can occur while executing a feature-set activation.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// No action is registered for the verb after all plugins have loaded.
    #[error("no action is registered for the verb '{verb}'")]
    UnknownAction {
        verb: String,
        span: Option<Span>,
    },

    /// A built-in action failed its precondition.
    #[error("{message}")]
    Action {
        message: String,
        span: Option<Span>,
    },

    /// A qualifier transformation failed or was not registered.
    #[error("the qualifier '{qualifier}' could not be applied: {message}")]
    Qualifier { qualifier: String, message: String },

    /// External I/O failed (network, filesystem, subprocess).
    #[error("service failure: {message}")]
    Service { message: String },

    /// A plugin returned malformed JSON or an unexpected response shape.
    #[error("protocol failure: {message}")]
    Protocol { message: String },

    /// A plugin call failed.
    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    /// User code executed a `throw` statement.
    #[error("thrown: {0}")]
    Thrown(RuntimeValue),

    /// The activation was cancelled during shutdown.
    #[error("the activation was cancelled")]
    Cancelled,

    /// A per-call deadline elapsed.
    #[error("{what} did not complete within {secs}s")]
    Timeout { what: String, secs: u64 },
}

impl RuntimeError {
    /// Creates an action-precondition error.
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
            span: None,
        }
    }

    /// Creates an action error carrying the statement's source span.
    pub fn action_at(message: impl Into<String>, span: Span) -> Self {
        Self::Action {
            message: message.into(),
            span: Some(span),
        }
    }

    /// Creates a service (external I/O) error.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a plugin error.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
