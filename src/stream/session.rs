use serde::Serialize;
use uuid::Uuid;

use super::accumulator::ContentAccumulator;
use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Pending,
    Streaming,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One attempt at answering a task. Never resumed: a retry gets a new
/// session with a new id.
///
/// ```text
/// PENDING --first byte--> STREAMING --done + extraction--> COMPLETED
///    |                        |
///    +-------- failure -------+-----------------------> FAILED
/// ```
#[derive(Debug)]
pub struct StreamSession {
    pub session_id: Uuid,
    pub task_id: String,
    provider_used: Option<String>,
    status: SessionStatus,
    failure: Option<ErrorKind>,
    pub accumulator: ContentAccumulator,
}

impl StreamSession {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            task_id: task_id.into(),
            provider_used: None,
            status: SessionStatus::Pending,
            failure: None,
            accumulator: ContentAccumulator::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn failure(&self) -> Option<ErrorKind> {
        self.failure
    }

    pub fn provider_used(&self) -> Option<&str> {
        self.provider_used.as_deref()
    }

    /// PENDING -> STREAMING. Returns false if the session already left
    /// PENDING.
    pub fn begin_streaming(&mut self, provider_id: &str) -> bool {
        if self.status != SessionStatus::Pending {
            return false;
        }
        self.provider_used = Some(provider_id.to_string());
        self.status = SessionStatus::Streaming;
        true
    }

    /// STREAMING -> COMPLETED.
    pub fn complete(&mut self) -> bool {
        if self.status != SessionStatus::Streaming {
            return false;
        }
        self.status = SessionStatus::Completed;
        true
    }

    /// Any non-terminal state -> FAILED. The first failure reason sticks.
    pub fn fail(&mut self, kind: ErrorKind) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = SessionStatus::Failed;
        self.failure = Some(kind);
        true
    }
}
