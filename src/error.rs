use crate::providers::types::Capability;
use serde::Serialize;
use thiserror::Error;

// ─── Error kinds ─────────────────────────────────────────────────────────────

/// Stable, caller-visible classification of every failure the engine can hit.
///
/// Only [`ErrorKind::ProviderUnavailable`] (including an exhausted failover
/// chain) is fatal to a request before streaming starts; every other kind
/// degrades so the caller always receives a terminated stream. Client
/// cancellation exists only as a kind, never as an [`AnalysisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::AsRefStr, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ProviderUnavailable,
    ConnectionError,
    UpstreamError,
    DecodeError,
    ExtractionEmpty,
    PersistenceError,
    ClientCancelled,
}

// ─── Analysis errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no active provider supports capability {capability}")]
    ProviderUnavailable { capability: Capability },

    #[error("all providers failed. Attempts:\n{}", attempts.join("\n"))]
    ChainExhausted { attempts: Vec<String> },

    #[error("provider {provider} connection failed: {message}")]
    Connection { provider: String, message: String },

    #[error("provider {provider} returned {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable { .. } | Self::ChainExhausted { .. } => {
                ErrorKind::ProviderUnavailable
            }
            Self::Connection { .. } => ErrorKind::ConnectionError,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::Persistence(_) => ErrorKind::PersistenceError,
        }
    }

    /// 4xx responses other than 408/429 will not improve on retry; the
    /// dispatcher moves straight to the next candidate.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Upstream { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            Self::ProviderUnavailable { .. }
            | Self::ChainExhausted { .. }
            | Self::Persistence(_) => false,
        }
    }
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),
}
