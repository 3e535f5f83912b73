use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::signature::{DEFAULT_LEVELS, DEFAULT_THRESHOLD, MAX_LEVELS, SignatureKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Engine tunables. Every field has a default, so a config file only needs
/// the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum signature distance for two images to share a cluster
    pub threshold: u32,
    /// Quantization buckets per luminance cell
    pub levels: u8,
    pub signature: SignatureKind,
    pub include_subdirectories: bool,
    pub show_hidden: bool,
    /// Read width/height from file headers while enumerating
    pub probe_dimensions: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            levels: DEFAULT_LEVELS,
            signature: SignatureKind::default(),
            include_subdirectories: false,
            show_hidden: false,
            probe_dimensions: true,
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels < 2 || self.levels > MAX_LEVELS {
            return Err(ConfigError::Invalid {
                message: format!("levels must be between 2 and {}", MAX_LEVELS),
            });
        }
        Ok(())
    }
}
