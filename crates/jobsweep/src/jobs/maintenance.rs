use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::jobs::model::{ExpirationPolicy, Finished, JobFilter};
use crate::jobs::repo::JobStore;
use crate::jobs::tick::{Sweep, SweepSummary};

/// Deletes jobs whose last completed run is older than the expiration policy.
#[derive(Clone)]
pub struct CleanupSweep {
    jobs: Arc<dyn JobStore>,
    policy: ExpirationPolicy,
    normal_only: bool,
}

impl CleanupSweep {
    pub fn new(jobs: Arc<dyn JobStore>, policy: ExpirationPolicy, normal_only: bool) -> Self {
        Self {
            jobs,
            policy,
            normal_only,
        }
    }

    /// One pass using `now` as the reference time.
    /// Jobs finishing exactly at the threshold are kept.
    pub async fn run_at(&self, now: DateTime<Utc>) -> anyhow::Result<SweepSummary> {
        let threshold = self.policy.threshold(now).ok_or_else(|| {
            anyhow::anyhow!(
                "expiration window of {}s reaches before the earliest representable time",
                self.policy.duration.num_seconds()
            )
        })?;
        let filter = if self.normal_only {
            JobFilter::Normal
        } else {
            JobFilter::All
        };

        let candidates = self.jobs.find(filter).await?;
        let mut summary = SweepSummary {
            scanned: candidates.len(),
            ..SweepSummary::default()
        };

        for job in candidates {
            match job.finished() {
                // still pending or in flight
                Finished::Pending => continue,
                Finished::Invalid => {
                    warn!(
                        job_id = %job.id,
                        name = %job.name,
                        last_finished_at = ?job.last_finished_at,
                        "job has an invalid lastFinishedAt, skipping"
                    );
                    summary.skipped += 1;
                }
                Finished::At(finished) if finished < threshold => {
                    if self.jobs.cancel(job.id).await? > 0 {
                        info!(
                            job_id = %job.id,
                            name = %job.name,
                            finished_at = %finished,
                            "deleted expired job"
                        );
                        summary.affected += 1;
                    }
                }
                Finished::At(_) => {
                    debug!(job_id = %job.id, "job not yet expired");
                }
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl Sweep for CleanupSweep {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn run(&self) -> anyhow::Result<SweepSummary> {
        self.run_at(Utc::now()).await
    }
}
