//! Engine configuration loaded from TOML files.

use serde::Deserialize;
use std::path::Path;

use crate::domain::GardenPolicy;
use crate::error::{ConfigError, Result};
use crate::logging::LoggingConfig;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineSettings,
    /// Default policy template applied to new gardens unless the creator
    /// overrides it.
    #[serde(default)]
    pub default_policy: GardenPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine-wide limits.
#[derive(Debug, Deserialize)]
pub struct EngineSettings {
    /// Maximum operations a single strategy may bind.
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,
}

fn default_max_operations() -> usize {
    crate::engine::DEFAULT_MAX_OPERATIONS
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_operations: default_max_operations(),
        }
    }
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.engine.max_operations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_operations",
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        self.default_policy
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                field: "default_policy",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            default_policy: GardenPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}
