use std::cmp::Ordering;
use std::sync::Arc;

use super::health::HealthTracker;
use super::registry::ProviderRegistry;
use super::types::{Capability, ProviderConfig};
use crate::error::AnalysisError;

/// Builds the ordered failover chain for a task.
pub struct ProviderSelector {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthTracker>,
    demote_after_failures: u64,
}

impl ProviderSelector {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthTracker>,
        demote_after_failures: u64,
    ) -> Self {
        Self {
            registry,
            health,
            demote_after_failures,
        }
    }

    /// Active providers that support `capability`, ordered by priority, then
    /// cost, then id. Providers with a failure streak at or above the
    /// demotion threshold move to the back, keeping their relative order.
    ///
    /// Runs entirely on the registry snapshot; no network I/O happens here.
    pub fn select(&self, capability: Capability) -> Result<Vec<ProviderConfig>, AnalysisError> {
        let snapshot = self.registry.snapshot();
        let mut chain = build_chain(&snapshot, capability);

        if chain.is_empty() {
            return Err(AnalysisError::ProviderUnavailable { capability });
        }

        if self.demote_after_failures > 0 {
            let (healthy, demoted): (Vec<_>, Vec<_>) = chain.into_iter().partition(|p| {
                self.health.consecutive_failures(&p.id) < self.demote_after_failures
            });
            if !demoted.is_empty() {
                tracing::debug!(
                    demoted = demoted.len(),
                    "moving failing providers to the end of the chain"
                );
            }
            chain = healthy;
            chain.extend(demoted);
        }

        Ok(chain)
    }
}

/// Pure filter + sort over a provider list.
pub fn build_chain(providers: &[ProviderConfig], capability: Capability) -> Vec<ProviderConfig> {
    let mut chain: Vec<ProviderConfig> = providers
        .iter()
        .filter(|p| p.active && p.supports(capability))
        .cloned()
        .collect();
    chain.sort_by(compare_candidates);
    chain
}

fn compare_candidates(a: &ProviderConfig, b: &ProviderConfig) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| a.cost_per_1k_tokens.total_cmp(&b.cost_per_1k_tokens))
        .then_with(|| a.id.cmp(&b.id))
}
