//! Session orchestration: turns a [`Task`] into a relayed event stream and a
//! persisted result.

pub mod events;
pub mod prompts;
pub mod runner;
pub mod task;

pub use events::RelayEvent;
pub use runner::{AnalysisEngine, AnalysisHandle, RelayStream, SessionOutcome};
pub use task::{Task, TaskFlags};
