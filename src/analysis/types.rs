use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the fields of an [`ExtractionResult`] were obtained.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExtractionConfidence {
    /// A fenced JSON block carried the fields.
    StructuredJson,
    /// At least one section marker matched.
    MarkerMatch,
    /// Nothing matched; every field is a default.
    Default,
}

/// Structured fields derived from a completed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub category: String,
    pub subcategory: String,
    pub error_type: String,
    pub source_text: String,
    pub solution: String,
    /// 1..=5
    pub difficulty: u8,
    pub tags: BTreeSet<String>,
    /// The complete answer, never truncated.
    pub raw_answer_text: String,
    pub extraction_confidence: ExtractionConfidence,
}

/// Task-side context the extractor falls back on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionContext {
    pub subject: Option<String>,
    pub category: Option<String>,
}
