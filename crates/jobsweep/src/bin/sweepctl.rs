use std::env;
use std::sync::Arc;

use jobsweep::config::Config;
use jobsweep::db;
use jobsweep::jobs::{
    CleanupSweep, FailureNotifySweep, JobFilter, JobStore, NotificationKey, NotificationLedger,
    PgJobStore, PgNotificationLedger, SendGridSender, Sweep,
};
use jobsweep::logging;

const USAGE: &str = "sweepctl <command>\n\
     Commands:\n\
     - migrate   apply the bundled migrations and create the configured collections\n\
     - cleanup   run one stale-job cleanup sweep\n\
     - notify    run one failure notification sweep\n\
     - failed    list failed jobs and whether they were notified\n\
     \n\
     Uses SWEEP_DATABASE_URL or DATABASE_URL.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    let Some(command) = args.get(1) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let cfg = Config::from_env()?;
    logging::init(cfg.log_json);

    let pool = db::make_pool(&cfg).await?;
    let jobs = Arc::new(PgJobStore::new(pool.clone(), cfg.collection.clone()));
    let ledger = Arc::new(PgNotificationLedger::new(
        pool.clone(),
        cfg.ledger_collection.clone(),
    ));

    match command.as_str() {
        "migrate" => {
            db::prepare_collections(&pool, &cfg).await?;
            println!("migrations OK ({}, {})", cfg.collection, cfg.ledger_collection);
        }
        "cleanup" => {
            let sweep = CleanupSweep::new(jobs, cfg.expiration_policy()?, cfg.cleanup_normal_only);
            let summary = sweep.run().await?;
            println!("cleanup: {summary}");
        }
        "notify" => {
            let settings = cfg.notify_settings()?;
            let sender = Arc::new(SendGridSender::new(settings.delivery_key, settings.from));
            let sweep = FailureNotifySweep::new(
                jobs,
                ledger,
                sender,
                settings.recipients,
                settings.environment,
            );
            let summary = sweep.run().await?;
            println!("notify: {summary}");
        }
        "failed" => print_failed(jobs.as_ref(), ledger.as_ref()).await?,
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    pool.close().await;
    Ok(())
}

async fn print_failed(jobs: &PgJobStore, ledger: &PgNotificationLedger) -> anyhow::Result<()> {
    let failed = jobs.find(JobFilter::Failed).await?;
    if failed.is_empty() {
        println!("no failed jobs in {}", jobs.collection());
        return Ok(());
    }

    for job in failed {
        let Some(failed_at) = job.failed_at.as_ref() else {
            continue;
        };
        let key = NotificationKey::new(job.id, failed_at);
        let status = match ledger.find_one(&key).await? {
            Some(rec) => format!(
                "notified {} ({}/{} delivered)",
                rec.notified_at.to_rfc3339(),
                rec.delivered,
                rec.recipients.len()
            ),
            None => "pending".to_string(),
        };
        println!(
            "{}  {:<30}  failed_at={}  {}",
            job.id, job.name, key.failed_at, status
        );
    }

    Ok(())
}
