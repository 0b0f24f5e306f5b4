//! Axum task-intake surface: builds a [`Task`](crate::engine::Task) from an
//! inbound request and relays the engine's event stream unmodified.

mod handlers;
mod server;
mod sse;

pub use handlers::{AnalyzeRequest, ImageInput};
pub use server::{build_app, run_gateway, run_gateway_with_listener};
pub use sse::build_sse_response;

use crate::engine::AnalysisEngine;
use crate::persistence::ProblemStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Applies to producing the response head; relayed streams run past it.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalysisEngine>,
    pub store: Option<Arc<dyn ProblemStore>>,
    /// Re-read by `POST /api/providers/reload` when no body is sent.
    pub config_path: PathBuf,
}
