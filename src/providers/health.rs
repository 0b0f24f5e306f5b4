use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Rolling counters for one provider. All fields are updated with atomic
/// increments; only `last_error` sits behind its own per-provider mutex.
#[derive(Debug, Default)]
struct ProviderHealth {
    successes: AtomicU64,
    failures: AtomicU64,
    consecutive_failures: AtomicU64,
    total_latency_ms: AtomicU64,
    last_latency_ms: AtomicU64,
    last_updated_unix: AtomicU64,
    last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealthSnapshot {
    pub provider_id: String,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub avg_latency_ms: Option<u64>,
    pub last_latency_ms: Option<u64>,
    pub last_updated_unix: Option<u64>,
    pub last_error: Option<String>,
}

/// Per-provider success/failure/latency tracking.
///
/// Read by the selector for soft demotion and by the health endpoint.
/// Providers never share counters; the map lock is only taken for writing
/// the first time a provider id is seen.
#[derive(Debug, Default)]
pub struct HealthTracker {
    providers: RwLock<HashMap<String, Arc<ProviderHealth>>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, provider_id: &str) -> Arc<ProviderHealth> {
        if let Some(existing) = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
        {
            return Arc::clone(existing);
        }

        let mut map = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(map.entry(provider_id.to_string()).or_default())
    }

    pub fn record(&self, provider_id: &str, success: bool, latency: Duration) {
        let health = self.entry(provider_id);
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

        if success {
            health.successes.fetch_add(1, Ordering::Relaxed);
            health.consecutive_failures.store(0, Ordering::Relaxed);
            health
                .total_latency_ms
                .fetch_add(latency_ms, Ordering::Relaxed);
            health.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        } else {
            health.failures.fetch_add(1, Ordering::Relaxed);
            health.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }

        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        health.last_updated_unix.store(now, Ordering::Relaxed);
    }

    /// Same as a failed [`record`](Self::record), keeping the error text for
    /// the status endpoint.
    pub fn record_failure(&self, provider_id: &str, latency: Duration, error: &str) {
        self.record(provider_id, false, latency);
        let health = self.entry(provider_id);
        *health
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }

    pub fn consecutive_failures(&self, provider_id: &str) -> u64 {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider_id)
            .map_or(0, |h| h.consecutive_failures.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self, provider_id: &str) -> Option<ProviderHealthSnapshot> {
        let map = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        map.get(provider_id)
            .map(|health| Self::snapshot_one(provider_id, health))
    }

    /// All tracked providers, sorted by id.
    pub fn snapshot_all(&self) -> Vec<ProviderHealthSnapshot> {
        let map = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = map
            .iter()
            .map(|(id, health)| Self::snapshot_one(id, health))
            .collect();
        all.sort_by(|a, b| a.provider_id.cmp(&b.provider_id));
        all
    }

    fn snapshot_one(provider_id: &str, health: &ProviderHealth) -> ProviderHealthSnapshot {
        let successes = health.successes.load(Ordering::Relaxed);
        let total_latency = health.total_latency_ms.load(Ordering::Relaxed);
        let last_updated = health.last_updated_unix.load(Ordering::Relaxed);
        ProviderHealthSnapshot {
            provider_id: provider_id.to_string(),
            successes,
            failures: health.failures.load(Ordering::Relaxed),
            consecutive_failures: health.consecutive_failures.load(Ordering::Relaxed),
            avg_latency_ms: (successes > 0).then(|| total_latency / successes),
            last_latency_ms: (successes > 0)
                .then(|| health.last_latency_ms.load(Ordering::Relaxed)),
            last_updated_unix: (last_updated > 0).then_some(last_updated),
            last_error: health
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
