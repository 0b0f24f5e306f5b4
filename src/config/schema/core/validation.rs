use super::Config;
use crate::error::ConfigError;
use crate::providers::types::ProviderConfig;
use std::collections::HashSet;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reliability = &self.reliability;
        if reliability.max_backoff_ms < reliability.base_backoff_ms {
            return Err(ConfigError::Validation(format!(
                "reliability.max_backoff_ms ({}) is below base_backoff_ms ({})",
                reliability.max_backoff_ms, reliability.base_backoff_ms
            )));
        }
        if self.extraction.solution_max_chars == 0 {
            return Err(ConfigError::Validation(
                "extraction.solution_max_chars must be positive".into(),
            ));
        }
        Self::validate_providers(&self.providers)
    }

    pub fn validate_providers(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for provider in providers {
            if provider.id.trim().is_empty() {
                return Err(ConfigError::Validation("provider id must not be empty".into()));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate provider id: {}",
                    provider.id
                )));
            }
            if provider.endpoint.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "provider {}: endpoint must not be empty",
                    provider.id
                )));
            }
            if provider.model.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "provider {}: model must not be empty",
                    provider.id
                )));
            }
            if provider.connect_timeout_ms == 0 || provider.read_timeout_ms == 0 {
                return Err(ConfigError::Validation(format!(
                    "provider {}: timeouts must be positive",
                    provider.id
                )));
            }
            if provider.capabilities.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "provider {}: capability set must not be empty",
                    provider.id
                )));
            }
        }
        Ok(())
    }
}
