use serde_json::{Value, json};

use crate::error::ErrorKind;
use crate::persistence::SaveOutcome;

/// One item of the caller-facing stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// A decoded upstream chunk, possibly carrying `result_object`.
    Chunk(Value),
    SaveResult(SaveOutcome),
    Error { kind: ErrorKind, message: String },
    Done,
}

impl RelayEvent {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// `data: <json>\n\n` frame.
    pub fn to_sse(&self) -> String {
        let payload = match self {
            Self::Chunk(value) => value.to_string(),
            Self::SaveResult(outcome) => json!({ "save_result": outcome }).to_string(),
            Self::Error { kind, message } => {
                json!({ "error": { "kind": kind, "message": message } }).to_string()
            }
            Self::Done => "[DONE]".to_string(),
        };
        format!("data: {payload}\n\n")
    }
}

/// Closing chunk for a stream that ended without its own finish signal.
pub fn final_chunk(model: &str) -> Value {
    json!({
        "object": "chat.completion.chunk",
        "model": model,
        "choices": [{
            "index": 0,
            "delta": { "content": "" },
            "finish_reason": "stop",
        }],
    })
}
