use serde::Serialize;
use std::sync::Arc;

use super::traits::{FieldValue, ProblemStore};
use crate::analysis::ExtractionResult;
use crate::error::AnalysisError;

/// Result of a save, relayed to the caller as the `save_result` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
}

impl SaveOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(error: &AnalysisError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
        }
    }
}

type FieldMapper = fn(&ExtractionResult) -> FieldValue;

/// Store column <- result field.
const FIELD_TABLE: [(&str, FieldMapper); 9] = [
    ("category", |r| FieldValue::Text(r.category.clone())),
    ("subcategory", |r| FieldValue::Text(r.subcategory.clone())),
    ("error_type", |r| FieldValue::Text(r.error_type.clone())),
    ("source_text", |r| FieldValue::Text(r.source_text.clone())),
    ("solution", |r| FieldValue::Text(r.solution.clone())),
    ("difficulty", |r| FieldValue::Integer(i64::from(r.difficulty))),
    ("knowledge_tags", |r| {
        FieldValue::Text(serde_json::to_string(&r.tags).unwrap_or_else(|_| "[]".to_string()))
    }),
    ("ai_analysis", |r| FieldValue::Text(r.raw_answer_text.clone())),
    ("extraction_confidence", |r| {
        FieldValue::Text(r.extraction_confidence.to_string())
    }),
];

/// Column/value pairs for a result, in table order.
pub fn map_fields(result: &ExtractionResult) -> Vec<(&'static str, FieldValue)> {
    FIELD_TABLE
        .iter()
        .map(|(column, mapper)| (*column, mapper(result)))
        .collect()
}

/// Writes extraction results back to the problem store.
///
/// Saving is an overwrite of a fixed column set, so repeating a save with
/// the same result leaves the row as it was. When nothing would change, no
/// write happens at all.
pub struct PersistenceSink {
    store: Arc<dyn ProblemStore>,
}

impl PersistenceSink {
    pub fn new(store: Arc<dyn ProblemStore>) -> Self {
        Self { store }
    }

    /// Never fails: errors come back as an unsuccessful outcome.
    pub async fn save(&self, problem_id: i64, result: &ExtractionResult) -> SaveOutcome {
        match self.try_save(problem_id, result).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    problem_id,
                    store = self.store.name(),
                    error_kind = e.kind().as_ref(),
                    "Saving analysis result failed: {e}"
                );
                SaveOutcome::failed(&e)
            }
        }
    }

    async fn try_save(
        &self,
        problem_id: i64,
        result: &ExtractionResult,
    ) -> Result<SaveOutcome, AnalysisError> {
        let current = self
            .store
            .get_by_id(problem_id)
            .await
            .map_err(|e| AnalysisError::Persistence(format!("{e:#}")))?
            .ok_or_else(|| AnalysisError::Persistence(format!("problem {problem_id} not found")))?;

        let fields = map_fields(result);
        let unchanged = fields
            .iter()
            .all(|(column, value)| current.fields.get(*column) == Some(value));
        if unchanged {
            tracing::debug!(problem_id, "analysis result unchanged, skipping write");
            return Ok(SaveOutcome::ok("unchanged"));
        }

        self.store
            .update_fields(problem_id, fields)
            .await
            .map_err(|e| AnalysisError::Persistence(format!("{e:#}")))?;

        tracing::info!(problem_id, store = self.store.name(), "analysis result saved");
        Ok(SaveOutcome::ok("saved"))
    }
}
