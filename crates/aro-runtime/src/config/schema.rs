//! Configuration schema for `aro.yaml`.
//!
//! An application directory may carry an optional `aro.yaml` next to its
//! `.aro` sources:
//!
//! ```yaml
//! logging:
//!   level: debug
//!
//! runtime:
//!   grace_period_secs: 5
//!
//! plugins:
//!   collections:
//!     max-depth: 4
//! ```
//!
//! The `plugins` section is free-form: each plugin receives its own raw
//! section at load time, exactly as written.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for an ARO application.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AroConfig {
    /// Logging settings.
    pub logging: LoggingConfig,

    /// Runtime behavior settings.
    pub runtime: RuntimeSettings,

    /// Per-plugin configuration sections, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,
}

impl AroConfig {
    /// The raw configuration section for one plugin, when present.
    pub fn plugin_section(&self, name: &str) -> Option<&serde_json::Value> {
        self.plugins.get(name)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level: trace, debug, info, warn, error.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Runtime behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// How long the event queue may take to drain on shutdown.
    pub grace_period_secs: u64,

    /// Per-call deadline for subprocess and external service calls.
    pub call_timeout_secs: u64,
}

impl RuntimeSettings {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
            call_timeout_secs: 30,
        }
    }
}

/// Validates a loaded configuration.
pub fn validate_config(config: &AroConfig) -> super::error::ConfigResult<()> {
    const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "warning", "error"];
    if !LEVELS.contains(&config.logging.level.to_ascii_lowercase().as_str()) {
        return Err(super::error::ConfigError::validation(format!(
            "unknown log level '{}'",
            config.logging.level
        )));
    }
    if config.runtime.grace_period_secs > 600 {
        return Err(super::error::ConfigError::validation(
            "grace_period_secs must be at most 600",
        ));
    }
    Ok(())
}
