//! Logging bootstrap.
//!
//! A thin builder over `tracing-subscriber` with environment-based
//! filtering. Initialization is idempotent: the first caller wins, later
//! calls are ignored, so embedding the runtime in a host that already set
//! a subscriber is safe.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Tracks whether a subscriber was installed by this process.
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Builder for the runtime's logging setup.
///
/// # Example
///
/// ```rust,ignore
/// use aro_runtime::logging::LoggingBuilder;
///
/// LoggingBuilder::new().with_level(tracing::Level::DEBUG).init();
/// ```
pub struct LoggingBuilder {
    level: Level,
    directive: Option<String>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            level: Level::INFO,
            directive: None,
        }
    }

    /// Sets the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets an explicit filter directive (overrides the level).
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = Some(directive.into());
        self
    }

    /// Installs the global subscriber. `RUST_LOG` takes precedence over the
    /// configured level. Idempotent.
    pub fn init(self) {
        if LOGGING_INITIALIZED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let fallback = self
            .directive
            .unwrap_or_else(|| self.level.to_string().to_lowercase());
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(fallback));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes logging from a configured level name.
pub fn init_from_level(level: &str) {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    LoggingBuilder::new().with_level(level).init();
}

/// Returns whether logging has been initialized.
pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::SeqCst)
}
