pub mod extractor;
pub mod markers;
pub mod types;

pub use extractor::ResultExtractor;
pub use types::{ExtractionConfidence, ExtractionContext, ExtractionResult};
