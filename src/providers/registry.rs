use arc_swap::ArcSwap;
use std::path::Path;
use std::sync::Arc;

use super::types::ProviderConfig;
use crate::config::Config;

/// Holds the current provider list.
///
/// Readers take a lock-free [`snapshot`](Self::snapshot) that stays valid for
/// the whole request; [`reload`](Self::reload) atomically swaps in a new list,
/// so admin updates never race with an in-flight selection.
pub struct ProviderRegistry {
    inner: ArcSwap<Vec<ProviderConfig>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(providers),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.providers.clone())
    }

    /// Read-only view of the provider list as of this call.
    pub fn snapshot(&self) -> Arc<Vec<ProviderConfig>> {
        self.inner.load_full()
    }

    /// Replace the provider list. Existing snapshots are unaffected.
    pub fn reload(&self, providers: Vec<ProviderConfig>) -> anyhow::Result<()> {
        Config::validate_providers(&providers)?;
        let count = providers.len();
        self.inner.store(Arc::new(providers));
        tracing::info!(providers = count, "provider registry reloaded");
        Ok(())
    }

    /// Re-read the `[[providers]]` list from a config file on disk.
    pub fn reload_from_path(&self, path: &Path) -> anyhow::Result<()> {
        let config = Config::load_from_path(path)?;
        self.reload(config.providers)
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}
