use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::ExtractionContext;
use crate::providers::types::{Capability, ChatMessage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFlags {
    /// Use the review prompt (re-checking a student's own corrected
    /// attempt) instead of the first-analysis prompt.
    #[serde(default)]
    pub review_mode: bool,
}

/// One analysis request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// Problem row the result is written back to; `None` skips persistence.
    pub problem_id: Option<i64>,
    pub required_capability: Capability,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub flags: TaskFlags,
}

impl Task {
    /// New task with a fresh id. Requires VISION when any message carries
    /// an image.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        let required_capability = if messages.iter().any(ChatMessage::has_image) {
            Capability::Vision
        } else {
            Capability::Text
        };
        Self {
            task_id: Uuid::new_v4().to_string(),
            problem_id: None,
            required_capability,
            subject: None,
            category: None,
            messages,
            flags: TaskFlags::default(),
        }
    }

    pub fn with_problem(mut self, problem_id: i64) -> Self {
        self.problem_id = Some(problem_id);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_review_mode(mut self, review_mode: bool) -> Self {
        self.flags.review_mode = review_mode;
        self
    }

    pub fn extraction_context(&self) -> ExtractionContext {
        ExtractionContext {
            subject: self.subject.clone(),
            category: self.category.clone(),
        }
    }
}
