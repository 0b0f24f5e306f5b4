pub mod adapter;
pub mod dispatcher;
mod gemini_types;
pub mod health;
pub mod http_client;
mod openai_types;
pub mod registry;
pub mod scrub;
pub mod selector;
pub mod types;

pub use adapter::{ChunkDelta, ProviderAdapter, adapter_for};
pub use dispatcher::{Connected, RequestDispatcher};
pub use health::{HealthTracker, ProviderHealthSnapshot};
pub use registry::ProviderRegistry;
pub use selector::ProviderSelector;
pub use types::{Capability, ChatMessage, ContentPart, MessageRole, ProviderConfig, ProviderKind};
