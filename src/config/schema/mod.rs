mod core;
mod sections;

pub use core::Config;
pub use sections::{ExtractionConfig, GatewayConfig, ReliabilityConfig, StoreConfig};
