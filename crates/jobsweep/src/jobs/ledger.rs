use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::jobs::model::{NotificationKey, NotificationRecord};

/// Durable record of failures already reported.
#[async_trait]
pub trait NotificationLedger: Send + Sync {
    async fn find_one(&self, key: &NotificationKey) -> anyhow::Result<Option<NotificationRecord>>;

    /// Upsert by `record.key`; an existing row is replaced.
    async fn replace(&self, record: &NotificationRecord) -> anyhow::Result<()>;
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    job_id: Uuid,
    failed_at: String,
    recipients: Vec<String>,
    subject: String,
    body: String,
    delivered: i32,
    notified_at: DateTime<Utc>,
}

impl From<NotificationRow> for NotificationRecord {
    fn from(row: NotificationRow) -> Self {
        NotificationRecord {
            key: NotificationKey {
                job_id: row.job_id,
                failed_at: row.failed_at,
            },
            recipients: row.recipients,
            subject: row.subject,
            body: row.body,
            delivered: row.delivered,
            notified_at: row.notified_at,
        }
    }
}

#[derive(Clone)]
pub struct PgNotificationLedger {
    pool: PgPool,
    collection: String,
}

impl PgNotificationLedger {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    /// Creates the ledger table under the configured name if it is missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                job_id      UUID        NOT NULL,
                failed_at   TEXT        NOT NULL,
                recipients  TEXT[]      NOT NULL,
                subject     TEXT        NOT NULL,
                body        TEXT        NOT NULL,
                delivered   INTEGER     NOT NULL DEFAULT 0,
                notified_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (job_id, failed_at)
            )
            "#,
            self.collection
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Most recent notifications for one job, newest first.
    pub async fn list_for_job(&self, job_id: Uuid) -> anyhow::Result<Vec<NotificationRecord>> {
        let sql = format!(
            r#"
            SELECT job_id, failed_at, recipients, subject, body, delivered, notified_at
            FROM "{}"
            WHERE job_id = $1
            ORDER BY notified_at DESC
            "#,
            self.collection
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(NotificationRecord::from).collect())
    }
}

#[async_trait]
impl NotificationLedger for PgNotificationLedger {
    async fn find_one(&self, key: &NotificationKey) -> anyhow::Result<Option<NotificationRecord>> {
        let sql = format!(
            r#"
            SELECT job_id, failed_at, recipients, subject, body, delivered, notified_at
            FROM "{}"
            WHERE job_id = $1 AND failed_at = $2
            "#,
            self.collection
        );
        let row = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(key.job_id)
            .bind(&key.failed_at)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(NotificationRecord::from))
    }

    async fn replace(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        let sql = format!(
            r#"
            INSERT INTO "{}" (job_id, failed_at, recipients, subject, body, delivered, notified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (job_id, failed_at) DO UPDATE
            SET recipients = EXCLUDED.recipients,
                subject = EXCLUDED.subject,
                body = EXCLUDED.body,
                delivered = EXCLUDED.delivered,
                notified_at = EXCLUDED.notified_at
            "#,
            self.collection
        );
        sqlx::query(&sql)
            .bind(record.key.job_id)
            .bind(&record.key.failed_at)
            .bind(&record.recipients)
            .bind(&record.subject)
            .bind(&record.body)
            .bind(record.delivered)
            .bind(record.notified_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
