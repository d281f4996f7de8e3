use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Counts reported by one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub scanned: usize,
    /// Deleted (cleanup) or newly notified (notify).
    pub affected: usize,
    /// Invalid timestamps (cleanup) or already-notified failures (notify).
    pub skipped: usize,
}

impl fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scanned={} affected={} skipped={}",
            self.scanned, self.affected, self.skipped
        )
    }
}

/// One maintenance pass over the job store.
#[async_trait]
pub trait Sweep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> anyhow::Result<SweepSummary>;
}

/// Runs a sweep, waits `interval` after it returns, repeats until cancelled.
///
/// The next run is only scheduled once the previous one has finished, so
/// runs of the same sweep never overlap and the effective period is the
/// run duration plus `interval`.
pub struct TickLoop {
    sweep: Arc<dyn Sweep>,
    interval: Duration,
    cancel: CancellationToken,
}

impl TickLoop {
    pub fn new(sweep: Arc<dyn Sweep>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            sweep,
            interval,
            cancel,
        }
    }

    /// Returns the number of runs attempted. Each run executes in its own task,
    /// so a panicking sweep is logged like a failed run and the loop carries on.
    pub async fn run(self) -> u64 {
        let name = self.sweep.name();
        info!(sweep = name, interval_secs = self.interval.as_secs_f64(), "sweep loop started");

        let mut runs = 0u64;
        while !self.cancel.is_cancelled() {
            let sweep = Arc::clone(&self.sweep);
            match tokio::spawn(async move { sweep.run().await }).await {
                Ok(Ok(summary)) => info!(
                    sweep = name,
                    scanned = summary.scanned,
                    affected = summary.affected,
                    skipped = summary.skipped,
                    "sweep run complete"
                ),
                Ok(Err(e)) => error!(sweep = name, error = ?e, "sweep run failed"),
                Err(join) => error!(sweep = name, error = %join, "sweep run panicked"),
            }
            runs += 1;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(sweep = name, runs, "sweep loop stopped");
        runs
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }
}
