use anyhow::Context;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use super::traits::{FieldValue, ProblemStore, StoredProblem};

const TEXT_COLUMNS: [&str; 8] = [
    "category",
    "subcategory",
    "error_type",
    "source_text",
    "solution",
    "knowledge_tags",
    "ai_analysis",
    "extraction_confidence",
];
const INTEGER_COLUMNS: [&str; 1] = ["difficulty"];

async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS problems (
            id                    INTEGER PRIMARY KEY AUTOINCREMENT,
            category              TEXT,
            subcategory           TEXT,
            error_type            TEXT,
            source_text           TEXT,
            solution              TEXT,
            difficulty            INTEGER,
            knowledge_tags        TEXT,
            ai_analysis           TEXT,
            extraction_confidence TEXT,
            image_path            TEXT,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_problems_category ON problems(category);",
    )
    .execute(pool)
    .await
    .context("initialize problems schema")?;
    Ok(())
}

/// SQLite-backed problem store.
pub struct SqliteProblemStore {
    pool: SqlitePool,
}

impl SqliteProblemStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create database directory")?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .context("open SQLite database")?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database on a single connection (each extra connection to
    /// `sqlite::memory:` would be a separate, empty database).
    pub async fn in_memory() -> anyhow::Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("open in-memory SQLite")?;
        init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Create a problem row with only its question text, as the intake
    /// layer does on upload. Returns the new id.
    pub async fn insert_problem(&self, source_text: &str) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO problems (source_text, created_at, updated_at) VALUES (?1, ?2, ?2)",
        )
        .bind(source_text)
        .bind(&now)
        .execute(&self.pool)
        .await
        .context("insert problem")?;
        Ok(result.last_insert_rowid())
    }

    async fn fetch(&self, id: i64) -> anyhow::Result<Option<StoredProblem>> {
        let row = sqlx::query(
            "SELECT id, category, subcategory, error_type, source_text, solution, difficulty,
                    knowledge_tags, ai_analysis, extraction_confidence, updated_at
             FROM problems WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("fetch problem")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut fields = BTreeMap::new();
        for column in TEXT_COLUMNS {
            if let Some(value) = row.try_get::<Option<String>, _>(column)? {
                fields.insert(column.to_string(), FieldValue::Text(value));
            }
        }
        for column in INTEGER_COLUMNS {
            if let Some(value) = row.try_get::<Option<i64>, _>(column)? {
                fields.insert(column.to_string(), FieldValue::Integer(value));
            }
        }

        Ok(Some(StoredProblem {
            id: row.try_get("id")?,
            fields,
            updated_at: row.try_get("updated_at")?,
        }))
    }

    async fn update(&self, id: i64, fields: Vec<(&'static str, FieldValue)>) -> anyhow::Result<()> {
        if let Some((column, _)) = fields
            .iter()
            .find(|(c, _)| !TEXT_COLUMNS.contains(c) && !INTEGER_COLUMNS.contains(c))
        {
            anyhow::bail!("unknown problem column: {column}");
        }
        if fields.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = fields
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE problems SET {}, updated_at = ?{} WHERE id = ?{}",
            assignments.join(", "),
            fields.len() + 1,
            fields.len() + 2
        );

        let mut query = sqlx::query(&sql);
        for (_, value) in fields {
            query = match value {
                FieldValue::Text(text) => query.bind(text),
                FieldValue::Integer(n) => query.bind(n),
            };
        }
        query = query.bind(Utc::now().to_rfc3339()).bind(id);

        let mut tx = self.pool.begin().await.context("begin update")?;
        let result = query
            .execute(&mut *tx)
            .await
            .context("update problem fields")?;
        if result.rows_affected() == 0 {
            anyhow::bail!("problem {id} not found");
        }
        tx.commit().await.context("commit update")?;
        Ok(())
    }
}

impl ProblemStore for SqliteProblemStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn get_by_id(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredProblem>>> + Send + '_>> {
        Box::pin(async move { self.fetch(id).await })
    }

    fn update_fields(
        &self,
        id: i64,
        fields: Vec<(&'static str, FieldValue)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move { self.update(id, fields).await })
    }
}
