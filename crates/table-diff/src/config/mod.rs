//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::validate_thresholds;

use std::path::Path;

use crate::error::Result;

impl QueryPairConfig {
    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse from a YAML string and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QueryPairConfig = serde_yaml::from_str(yaml)?;
        validation::validate_query_pair(&config)?;
        Ok(config)
    }
}

impl CrossDbConfig {
    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse from a YAML string and validate.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CrossDbConfig = serde_yaml::from_str(yaml)?;
        validation::validate_cross_db(&config)?;
        Ok(config)
    }
}

impl ConnectionConfig {
    /// Load from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ConnectionConfig = serde_yaml::from_str(&content)?;
        validation::validate_db_target(&config.connection, "connection")?;
        Ok(config)
    }
}
