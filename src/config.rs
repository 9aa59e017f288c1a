use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

use crate::registry::DEFAULT_LISTENER_ATTRIBUTE;

pub const CONFIG_ENV: &str = "TRELLIS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid listener attribute name '{0}'")]
    InvalidAttribute(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    /// Attribute that mirrors the listener ids attached to a node.
    pub listener_attribute: String,
    pub base_url: Option<String>,
}

impl Default for TrellisConfig {
    fn default() -> Self {
        Self {
            listener_attribute: DEFAULT_LISTENER_ATTRIBUTE.to_string(),
            base_url: None,
        }
    }
}

impl TrellisConfig {
    /// Reads a YAML config. A missing path or file yields the defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_yaml::from_str(&contents)?
            }
            _ => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.listener_attribute;
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidAttribute(name.clone()))
        }
    }
}
