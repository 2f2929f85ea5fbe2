//! Application configuration (`aro.yaml`).

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config};
pub use schema::{AroConfig, LoggingConfig, RuntimeSettings, validate_config};
