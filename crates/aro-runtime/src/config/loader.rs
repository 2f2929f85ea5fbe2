//! Configuration file loader.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::error::{ConfigError, ConfigResult};
use super::schema::{AroConfig, validate_config};

/// Configuration loader with support for multiple search paths.
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Creates a new configuration loader with no search paths.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
        }
    }

    /// Adds a search path for configuration files.
    pub fn add_search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Adds the user config directory to the search paths.
    pub fn with_user_config_dir(self) -> Self {
        if let Some(config_dir) = dirs::config_dir() {
            self.add_search_path(config_dir.join("aro"))
        } else {
            self
        }
    }

    /// Loads configuration from the first available source, falling back to
    /// defaults when no file exists.
    pub fn load(&self) -> ConfigResult<AroConfig> {
        if let Some(path) = self.find_config_file() {
            return self.load_from_file(&path);
        }
        info!("No configuration file found, using defaults");
        Ok(AroConfig::default())
    }

    /// Loads configuration from a specific file.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<AroConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config = self.parse_yaml(&content)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn load_from_str(&self, yaml: &str) -> ConfigResult<AroConfig> {
        let config = self.parse_yaml(yaml)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Finds the first available configuration file.
    fn find_config_file(&self) -> Option<PathBuf> {
        const CONFIG_NAMES: &[&str] = &["aro.yaml", "aro.yml", ".aro.yaml", ".aro.yml"];

        for search_path in &self.search_paths {
            for name in CONFIG_NAMES {
                let path = search_path.join(name);
                debug!("Checking for config file: {}", path.display());
                if path.exists() {
                    info!("Found configuration file: {}", path.display());
                    return Some(path);
                }
            }
        }

        None
    }

    /// Parses YAML content with environment variable expansion.
    fn parse_yaml(&self, content: &str) -> ConfigResult<AroConfig> {
        let expanded = self.expand_env_vars(content);
        serde_yaml::from_str(&expanded).map_err(ConfigError::from)
    }

    /// Expands environment variables in the format ${VAR_NAME} or
    /// ${VAR_NAME:-default}.
    fn expand_env_vars(&self, content: &str) -> String {
        let mut result = content.to_string();
        let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(:-([^}]*))?\}").unwrap();

        for cap in re.captures_iter(content) {
            let full_match = cap.get(0).unwrap().as_str();
            let var_name = cap.get(1).unwrap().as_str();
            let default_value = cap.get(3).map(|m| m.as_str());

            let value = std::env::var(var_name)
                .ok()
                .or_else(|| default_value.map(String::from))
                .unwrap_or_default();

            result = result.replace(full_match, &value);
        }

        result
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new().with_user_config_dir()
    }
}

/// Convenience function to load the configuration of an application
/// directory.
pub fn load_config<P: AsRef<Path>>(application_dir: P) -> ConfigResult<AroConfig> {
    ConfigLoader::new()
        .add_search_path(application_dir)
        .with_user_config_dir()
        .load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let loader = ConfigLoader::new();
        let config = loader.load_from_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.runtime.grace_period_secs, 5);
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn minimal_config_parses() {
        let yaml = r#"
logging:
  level: debug
runtime:
  grace_period_secs: 2
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.runtime.grace_period().as_secs(), 2);
    }

    #[test]
    fn plugin_sections_stay_raw() {
        let yaml = r#"
plugins:
  collections:
    max-depth: 4
"#;
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        let section = config.plugin_section("collections").unwrap();
        assert_eq!(section["max-depth"], serde_json::json!(4));
    }

    #[test]
    fn invalid_level_is_rejected() {
        let yaml = "logging:\n  level: shouting\n";
        assert!(ConfigLoader::new().load_from_str(yaml).is_err());
    }

    #[test]
    fn env_var_default_value() {
        let yaml = "logging:\n  level: ${ARO_MISSING_LEVEL:-warn}\n";
        let config = ConfigLoader::new().load_from_str(yaml).unwrap();
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn missing_file_is_reported() {
        let loader = ConfigLoader::new();
        let err = loader.load_from_file("/nonexistent/aro.yaml");
        assert!(matches!(err, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
