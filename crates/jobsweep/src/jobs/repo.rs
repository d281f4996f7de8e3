// crates/jobsweep/src/jobs/repo.rs

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{JobFilter, JobRecord};

/// Read and prune access to the job collection.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn find(&self, filter: JobFilter) -> anyhow::Result<Vec<JobRecord>>;

    /// Removes the job document. Returns the number of rows removed.
    async fn cancel(&self, job_id: Uuid) -> anyhow::Result<u64>;
}

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
    collection: String,
}

impl PgJobStore {
    /// `collection` must already be a validated identifier (see `config::validate_identifier`).
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn select_sql(&self, filter: JobFilter) -> String {
        let predicate = match filter {
            JobFilter::All => "TRUE",
            JobFilter::Normal => "doc->>'type' = 'normal'",
            // Both present and non-null. Equality is decided on parsed
            // instants in `JobRecord::is_failed`, since the same instant can
            // be stored as different JSON.
            JobFilter::Failed => {
                "doc->'lastFinishedAt' IS NOT NULL
                  AND doc->'lastFinishedAt' <> 'null'::jsonb
                  AND doc->'failedAt' IS NOT NULL
                  AND doc->'failedAt' <> 'null'::jsonb"
            }
        };

        format!(
            r#"
            SELECT id, doc
            FROM "{}"
            WHERE {}
            ORDER BY id
            "#,
            self.collection, predicate
        )
    }

    /// Creates the job table under the configured name if it is missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let table = format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (id UUID PRIMARY KEY, doc JSONB NOT NULL)"#,
            self.collection
        );
        let index = format!(
            r#"CREATE INDEX IF NOT EXISTS "{0}_type_idx" ON "{0}" ((doc->>'type'))"#,
            self.collection
        );
        sqlx::query(&table).execute(&self.pool).await?;
        sqlx::query(&index).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<JobRecord>> {
        let sql = format!(r#"SELECT id, doc FROM "{}" WHERE id = $1"#, self.collection);
        let row = sqlx::query_as::<_, (Uuid, Value)>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id, doc)| JobRecord::from_document(id, doc)))
    }

    /// Writes a job document. Used by tooling and tests; the execution engine owns real writes.
    pub async fn upsert_document(&self, job_id: Uuid, doc: Value) -> anyhow::Result<()> {
        let sql = format!(
            r#"
            INSERT INTO "{}" (id, doc)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
            SET doc = EXCLUDED.doc
            "#,
            self.collection
        );
        sqlx::query(&sql)
            .bind(job_id)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn find(&self, filter: JobFilter) -> anyhow::Result<Vec<JobRecord>> {
        let sql = self.select_sql(filter);
        let rows = sqlx::query_as::<_, (Uuid, Value)>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, doc)| JobRecord::from_document(id, doc))
            .filter(|job| filter.matches(job))
            .collect())
    }

    async fn cancel(&self, job_id: Uuid) -> anyhow::Result<u64> {
        let sql = format!(r#"DELETE FROM "{}" WHERE id = $1"#, self.collection);
        let deleted = sqlx::query(&sql)
            .bind(job_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
