mod env_overrides;
mod loader;
mod validation;

use super::{ExtractionConfig, GatewayConfig, ReliabilityConfig, StoreConfig};
use crate::providers::types::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - resolved at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Config {
    /// Database path with relative paths anchored at the config directory.
    pub fn database_path(&self) -> PathBuf {
        if self.store.database.is_absolute() {
            return self.store.database.clone();
        }
        self.config_path
            .parent()
            .map_or_else(|| self.store.database.clone(), |dir| dir.join(&self.store.database))
    }
}
