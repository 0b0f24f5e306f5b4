pub mod sink;
pub mod sqlite;
pub mod traits;

pub use sink::{PersistenceSink, SaveOutcome};
pub use sqlite::SqliteProblemStore;
pub use traits::{FieldValue, ProblemStore, StoredProblem};
