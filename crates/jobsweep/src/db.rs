use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::config::Config;
use crate::jobs::{PgJobStore, PgNotificationLedger};

/// One pool shared by the job store and the notification ledger.
pub async fn make_pool(cfg: &Config) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(cfg.db_acquire_timeout)
        .connect(&cfg.database_url)
        .await?;

    info!(
        max_connections = cfg.db_max_connections,
        "connected to job store"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("migrations applied");
    Ok(())
}

/// Bundled migrations plus the configured collections, which may not use the
/// default names the migrations create.
pub async fn prepare_collections(pool: &PgPool, cfg: &Config) -> anyhow::Result<()> {
    run_migrations(pool).await?;
    PgJobStore::new(pool.clone(), cfg.collection.clone())
        .ensure_schema()
        .await?;
    PgNotificationLedger::new(pool.clone(), cfg.ledger_collection.clone())
        .ensure_schema()
        .await?;
    info!(
        collection = %cfg.collection,
        ledger = %cfg.ledger_collection,
        "collections ready"
    );
    Ok(())
}
