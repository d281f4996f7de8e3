use std::sync::Arc;

use jobsweep::config::Config;
use jobsweep::db;
use jobsweep::jobs::{
    CleanupSweep, FailureNotifySweep, JobStore, PgJobStore, PgNotificationLedger, SendGridSender,
    TickLoop,
};
use jobsweep::logging;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    logging::init(cfg.log_json);

    info!(
        collection = %cfg.collection,
        ledger = %cfg.ledger_collection,
        cleanup_interval_secs = cfg.cleanup_interval.as_secs(),
        notify_interval_secs = cfg.notify_interval.as_secs(),
        expiration_secs = cfg.expiration.as_secs(),
        normal_only = cfg.cleanup_normal_only,
        migrate_on_startup = cfg.migrate_on_startup,
        "sweeper starting"
    );

    let pool = db::make_pool(&cfg).await?;
    if cfg.migrate_on_startup {
        db::prepare_collections(&pool, &cfg).await?;
    }

    let jobs: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool.clone(), cfg.collection.clone()));
    let cancel = CancellationToken::new();

    // ---- Cleanup loop ----
    let cleanup = CleanupSweep::new(jobs.clone(), cfg.expiration_policy()?, cfg.cleanup_normal_only);
    let cleanup_handle =
        TickLoop::new(Arc::new(cleanup), cfg.cleanup_interval, cancel.clone()).spawn();

    // ---- Notify loop ----
    let notify_handle = match cfg.notify_settings() {
        Ok(settings) => {
            let ledger = Arc::new(PgNotificationLedger::new(
                pool.clone(),
                cfg.ledger_collection.clone(),
            ));
            let sender = Arc::new(SendGridSender::new(settings.delivery_key, settings.from));
            let notify = FailureNotifySweep::new(
                jobs.clone(),
                ledger,
                sender,
                settings.recipients,
                settings.environment,
            );
            Some(TickLoop::new(Arc::new(notify), cfg.notify_interval, cancel.clone()).spawn())
        }
        Err(reason) => {
            warn!(%reason, "failure notifications disabled");
            None
        }
    };

    shutdown_signal().await;
    info!("shutdown requested, waiting for in-flight sweeps");
    cancel.cancel();

    let cleanup_runs = cleanup_handle.await?;
    let notify_runs = match notify_handle {
        Some(handle) => handle.await?,
        None => 0,
    };

    pool.close().await;
    info!(cleanup_runs, notify_runs, "sweeper stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
