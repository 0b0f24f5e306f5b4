pub mod schema;

pub use schema::{Config, ExtractionConfig, GatewayConfig, ReliabilityConfig, StoreConfig};
