use std::sync::Arc;
use std::time::{Duration, Instant};

use super::adapter::build_request;
use super::health::HealthTracker;
use super::http_client::ClientPool;
use super::scrub::{api_error, sanitize_api_error};
use super::types::{ChatMessage, ProviderConfig};
use crate::error::AnalysisError;

/// Floor applied to the configured base backoff.
const MIN_BACKOFF_MS: u64 = 10;

/// A provider that answered with a 2xx and whose body has not been read yet.
pub struct Connected {
    pub provider: ProviderConfig,
    pub response: reqwest::Response,
}

/// Walks a failover chain until one provider opens a stream.
pub struct RequestDispatcher {
    clients: ClientPool,
    health: Arc<HealthTracker>,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RequestDispatcher {
    pub fn new(health: Arc<HealthTracker>, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        let base_backoff_ms = base_backoff_ms.max(MIN_BACKOFF_MS);
        Self {
            clients: ClientPool::new(),
            health,
            base_backoff_ms,
            max_backoff_ms: max_backoff_ms.max(base_backoff_ms),
        }
    }

    /// Try each provider in order. Transient failures (connection errors,
    /// timeouts, 5xx, 408, 429) are retried on the same provider with
    /// doubling backoff; other 4xx move on to the next provider at once.
    pub async fn connect(
        &self,
        chain: &[ProviderConfig],
        messages: &[ChatMessage],
    ) -> Result<Connected, AnalysisError> {
        let mut failures = Vec::new();

        for provider in chain {
            let mut backoff_ms = self.base_backoff_ms;

            for attempt in 0..=provider.max_retries {
                let started = Instant::now();
                match self.send_once(provider, messages).await {
                    Ok(response) => {
                        self.health.record(&provider.id, true, started.elapsed());
                        if attempt > 0 {
                            tracing::info!(
                                provider = provider.id.as_str(),
                                attempt,
                                "Provider recovered after retries"
                            );
                        }
                        return Ok(Connected {
                            provider: provider.clone(),
                            response,
                        });
                    }
                    Err(e) => {
                        self.health
                            .record_failure(&provider.id, started.elapsed(), &e.to_string());
                        failures.push(format!(
                            "{} attempt {}/{}: {e}",
                            provider.id,
                            attempt + 1,
                            provider.max_retries + 1
                        ));

                        if !e.is_retryable() {
                            tracing::warn!(
                                provider = provider.id.as_str(),
                                error_kind = e.kind().as_ref(),
                                "Non-retryable error, switching provider"
                            );
                            break;
                        }

                        if attempt < provider.max_retries {
                            tracing::warn!(
                                provider = provider.id.as_str(),
                                attempt = attempt + 1,
                                max_retries = provider.max_retries,
                                backoff_ms,
                                "Provider call failed, retrying"
                            );
                            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                            backoff_ms = backoff_ms.saturating_mul(2).min(self.max_backoff_ms);
                        }
                    }
                }
            }

            tracing::warn!(
                provider = provider.id.as_str(),
                "Switching to fallback provider"
            );
        }

        Err(AnalysisError::ChainExhausted { attempts: failures })
    }

    async fn send_once(
        &self,
        provider: &ProviderConfig,
        messages: &[ChatMessage],
    ) -> Result<reqwest::Response, AnalysisError> {
        let client = self.clients.client_for(provider);
        let request = build_request(&client, provider, messages);

        // Bounds the wait for response headers; body reads are bounded by the
        // client's per-read timeout.
        let deadline = provider.connect_timeout() + provider.read_timeout();
        let response = match tokio::time::timeout(deadline, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                return Err(AnalysisError::Connection {
                    provider: provider.id.clone(),
                    message: sanitize_api_error(&e.to_string()),
                });
            }
            Err(_) => {
                return Err(AnalysisError::Connection {
                    provider: provider.id.clone(),
                    message: format!("no response within {}ms", deadline.as_millis()),
                });
            }
        };

        if !response.status().is_success() {
            return Err(api_error(&provider.id, response).await);
        }
        Ok(response)
    }
}
