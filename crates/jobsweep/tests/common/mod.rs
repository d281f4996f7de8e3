#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use jobsweep::jobs::{
    DeliveryError, JobFilter, JobRecord, JobStore, NotificationKey, NotificationLedger,
    NotificationRecord, NotificationSender,
};
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

// ----------------------------
// In-memory collaborators
// ----------------------------

#[derive(Default)]
pub struct MemJobStore {
    jobs: Mutex<Vec<JobRecord>>,
    failing_finds: AtomicUsize,
    pub finds: AtomicUsize,
}

impl MemJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, doc: Value) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs
            .lock()
            .unwrap()
            .push(JobRecord::from_document(id, doc));
        id
    }

    pub fn replace_doc(&self, id: Uuid, doc: Value) {
        let mut jobs = self.jobs.lock().unwrap();
        let slot = jobs.iter_mut().find(|j| j.id == id).unwrap();
        *slot = JobRecord::from_document(id, doc);
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.jobs.lock().unwrap().iter().map(|j| j.id).collect()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids().contains(&id)
    }

    /// The next `n` calls to `find` return an error.
    pub fn fail_next_finds(&self, n: usize) {
        self.failing_finds.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for MemJobStore {
    async fn find(&self, filter: JobFilter) -> anyhow::Result<Vec<JobRecord>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.failing_finds.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.failing_finds.store(pending_failures - 1, Ordering::SeqCst);
            anyhow::bail!("connection reset by peer");
        }

        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect())
    }

    async fn cancel(&self, job_id: Uuid) -> anyhow::Result<u64> {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|j| j.id != job_id);
        Ok((before - jobs.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemLedger {
    records: Mutex<HashMap<NotificationKey, NotificationRecord>>,
    pub replaces: AtomicUsize,
    pub fail_lookups: std::sync::atomic::AtomicBool,
}

impl MemLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, key: &NotificationKey) -> Option<NotificationRecord> {
        self.records.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl NotificationLedger for MemLedger {
    async fn find_one(&self, key: &NotificationKey) -> anyhow::Result<Option<NotificationRecord>> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            anyhow::bail!("ledger unavailable");
        }
        Ok(self.records.lock().unwrap().get(key).cloned())
    }

    async fn replace(&self, record: &NotificationRecord) -> anyhow::Result<()> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .insert(record.key.clone(), record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

/// Records every attempt; recipients in `rejecting` fail.
#[derive(Default)]
pub struct RecordingSender {
    pub attempts: Mutex<Vec<SentMessage>>,
    rejecting: Vec<String>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(recipients: &[&str]) -> Self {
        Self {
            attempts: Mutex::default(),
            rejecting: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn attempts(&self) -> Vec<SentMessage> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempted_recipients(&self) -> Vec<String> {
        self.attempts().into_iter().map(|m| m.recipient).collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(SentMessage {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });

        if self.rejecting.iter().any(|r| r == recipient) {
            return Err(DeliveryError::Rejected {
                status: 550,
                body: "mailbox unavailable".to_string(),
            });
        }
        Ok(())
    }
}

// ----------------------------
// Job documents
// ----------------------------

pub fn finished_job(name: &str, last_finished_at: &str) -> Value {
    json!({
        "name": name,
        "type": "normal",
        "lastRunAt": last_finished_at,
        "lastFinishedAt": last_finished_at,
    })
}

pub fn failed_job(name: &str, failed_at: &str) -> Value {
    json!({
        "name": name,
        "type": "normal",
        "lastRunAt": failed_at,
        "lastFinishedAt": failed_at,
        "failedAt": failed_at,
        "failReason": "boom",
        "failCount": 1,
    })
}

pub fn pending_job(name: &str) -> Value {
    json!({
        "name": name,
        "type": "normal",
        "nextRunAt": "2030-01-01T00:00:00Z",
        "lastFinishedAt": null,
    })
}

// ----------------------------
// Postgres (optional)
// ----------------------------

/// Returns `None` when TEST_DATABASE_URL is not set so DB-backed tests can skip.
pub async fn setup_db() -> Option<PgPool> {
    let _ = dotenvy::dotenv();

    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL missing, skipping Postgres-backed test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to TEST_DATABASE_URL");

    jobsweep::db::run_migrations(&pool)
        .await
        .expect("migrations failed");

    sqlx::query(r#"TRUNCATE TABLE "agendaJobs", "agendaNotifications""#)
        .execute(&pool)
        .await
        .expect("truncate failed");

    Some(pool)
}
