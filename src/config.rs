//! Top-level configuration, loadable from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{runtime::handle::RuntimeConfig, sync::worker::SyncConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Missing keys take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSyncConfig {
    pub runtime: RuntimeConfig,
    pub sync: SyncConfig,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for FieldSyncConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            sync: SyncConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl FieldSyncConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
