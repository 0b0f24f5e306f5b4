use super::Config;
use std::path::PathBuf;

impl Config {
    /// Per-provider keys come from each provider's `api_key_env`, resolved at
    /// request time; this only covers process-level settings.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ERRATA_GATEWAY_HOST")
            && !host.is_empty()
        {
            self.gateway.host = host;
        }

        if let Ok(port_str) = std::env::var("ERRATA_GATEWAY_PORT")
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.gateway.port = port;
        }

        if let Ok(database) = std::env::var("ERRATA_DATABASE")
            && !database.is_empty()
        {
            self.store.database = PathBuf::from(database);
        }
    }
}
