use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::jobs::ledger::NotificationLedger;
use crate::jobs::model::{JobFilter, JobRecord, NotificationKey, NotificationRecord};
use crate::jobs::repo::JobStore;
use crate::jobs::sender::NotificationSender;
use crate::jobs::tick::{Sweep, SweepSummary};

/// Subject and body of one failure notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    pub subject: String,
    pub body: String,
}

/// Notifies every recipient once per distinct (job id, failedAt).
#[derive(Clone)]
pub struct FailureNotifySweep {
    jobs: Arc<dyn JobStore>,
    ledger: Arc<dyn NotificationLedger>,
    sender: Arc<dyn NotificationSender>,
    recipients: Vec<String>,
    environment: Option<String>,
}

impl FailureNotifySweep {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        ledger: Arc<dyn NotificationLedger>,
        sender: Arc<dyn NotificationSender>,
        recipients: Vec<String>,
        environment: Option<String>,
    ) -> Self {
        Self {
            jobs,
            ledger,
            sender,
            recipients,
            environment,
        }
    }

    pub fn compose(&self, job: &JobRecord, key: &NotificationKey) -> anyhow::Result<FailureMessage> {
        let subject = match self.environment.as_deref() {
            Some(env) => format!("[{env}] Job {} failed at {}", job.name, key.failed_at),
            None => format!("Job {} failed at {}", job.name, key.failed_at),
        };

        let snapshot = serde_json::to_string_pretty(&job.document)?;
        let body = format!(
            "Job \"{}\" ({}) failed at {}.\n\nJob snapshot:\n{}\n",
            job.name, job.id, key.failed_at, snapshot
        );

        Ok(FailureMessage { subject, body })
    }

    /// Attempts every recipient; returns how many accepted.
    async fn deliver(&self, job: &JobRecord, message: &FailureMessage) -> i32 {
        let mut delivered = 0;
        for recipient in &self.recipients {
            match self
                .sender
                .send(recipient, &message.subject, &message.body)
                .await
            {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    job_id = %job.id,
                    recipient = %recipient,
                    error = %e,
                    "failure notification not delivered"
                ),
            }
        }
        delivered
    }
}

#[async_trait]
impl Sweep for FailureNotifySweep {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn run(&self) -> anyhow::Result<SweepSummary> {
        let failed = self.jobs.find(JobFilter::Failed).await?;
        let mut summary = SweepSummary {
            scanned: failed.len(),
            ..SweepSummary::default()
        };

        for job in &failed {
            let Some(failed_at) = job.failed_at.as_ref().filter(|_| job.is_failed()) else {
                continue;
            };
            let key = NotificationKey::new(job.id, failed_at);

            if self.ledger.find_one(&key).await?.is_some() {
                debug!(job_id = %job.id, failed_at = %key.failed_at, "failure already notified");
                summary.skipped += 1;
                continue;
            }

            let message = self.compose(job, &key)?;
            let delivered = self.deliver(job, &message).await;

            // Recorded even when nothing was delivered: at most one batch per failure.
            let record = NotificationRecord {
                key,
                recipients: self.recipients.clone(),
                subject: message.subject,
                body: message.body,
                delivered,
                notified_at: Utc::now(),
            };
            self.ledger.replace(&record).await?;

            info!(
                job_id = %job.id,
                name = %job.name,
                failed_at = %record.key.failed_at,
                delivered,
                recipients = self.recipients.len(),
                "failure notified"
            );
            summary.affected += 1;
        }

        Ok(summary)
    }
}
