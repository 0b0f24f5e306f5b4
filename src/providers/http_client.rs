use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use super::types::ProviderConfig;

/// Streaming client: short connect timeout, per-read timeout instead of a
/// total deadline so long generations are not cut off.
pub fn build_streaming_client(connect_timeout: Duration, read_timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Reuses one client (and its connection pool) per timeout pair.
#[derive(Default)]
pub struct ClientPool {
    clients: Mutex<HashMap<(u64, u64), Client>>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_for(&self, provider: &ProviderConfig) -> Client {
        let key = (provider.connect_timeout_ms, provider.read_timeout_ms);
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        clients
            .entry(key)
            .or_insert_with(|| {
                build_streaming_client(provider.connect_timeout(), provider.read_timeout())
            })
            .clone()
    }
}
