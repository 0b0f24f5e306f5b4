use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// A column value as the problem store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
}

/// Current state of one problem row. NULL columns are absent from `fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredProblem {
    pub id: i64,
    pub fields: BTreeMap<String, FieldValue>,
    pub updated_at: Option<String>,
}

/// The external problem store this engine writes results back into.
pub trait ProblemStore: Send + Sync {
    fn name(&self) -> &str;

    fn get_by_id(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredProblem>>> + Send + '_>>;

    /// Overwrite the given columns (and bump `updated_at`) in one
    /// transaction.
    fn update_fields(
        &self,
        id: i64,
        fields: Vec<(&'static str, FieldValue)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}
