use std::time::Duration;

const MIN_INTERVAL: Duration = Duration::from_secs(1);
// Ten years; keeps `now - expiration` well inside chrono's range.
const MAX_EXPIRATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

// Runtime configuration for the maintenance daemon.
// Only this module knows values come from the environment; the sweeps get plain values.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub collection: String,
    pub ledger_collection: String,
    pub cleanup_interval: Duration,
    pub notify_interval: Duration,
    pub expiration: Duration,
    pub cleanup_normal_only: bool,
    pub notify_recipients: Vec<String>,
    pub delivery_key: Option<String>,
    pub notify_from: String,
    pub environment: Option<String>,
    pub migrate_on_startup: bool,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub log_json: bool,
}

/// Everything the notify sweep needs once it is known to be enabled.
#[derive(Clone, Debug)]
pub struct NotifySettings {
    pub recipients: Vec<String>,
    pub delivery_key: String,
    pub from: String,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyDisabled {
    #[error("no notification recipients configured (SWEEP_NOTIFY)")]
    NoRecipients,
    #[error("no delivery credential configured (SENDGRID_API_KEY)")]
    NoCredential,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let get_or = |primary: &str, fallback: &str| get(primary).or_else(|| get(fallback));
        let secs = |key: &str, default: u64| {
            get(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };
        let flag = |key: &str, default: bool| get(key).map(|v| parse_bool(&v)).unwrap_or(default);

        let database_url = get_or("SWEEP_DATABASE_URL", "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let collection = validate_identifier(
            &get_or("SWEEP_COLLECTION", "COLLECTION").unwrap_or_else(|| "agendaJobs".to_string()),
        )?;
        let ledger_collection = validate_identifier(
            &get("SWEEP_LEDGER_COLLECTION").unwrap_or_else(|| "agendaNotifications".to_string()),
        )?;
        if collection == ledger_collection {
            anyhow::bail!("job collection and ledger collection must differ ({collection})");
        }

        let notify_recipients = get_or("SWEEP_NOTIFY", "NOTIFY")
            .map(|s| parse_recipients(&s))
            .unwrap_or_default();

        let db_max_connections = get("SWEEP_DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(4)
            .clamp(1, 32);

        let db_acquire_timeout = {
            let d = secs("SWEEP_DB_ACQUIRE_TIMEOUT_SECS", 10);
            d.clamp(Duration::from_secs(1), Duration::from_secs(60))
        };

        Ok(Self {
            database_url,
            collection,
            ledger_collection,
            cleanup_interval: secs("SWEEP_CLEANUP_INTERVAL_SECS", 120).max(MIN_INTERVAL),
            notify_interval: secs("SWEEP_NOTIFY_INTERVAL_SECS", 60).max(MIN_INTERVAL),
            expiration: secs("SWEEP_EXPIRATION_SECS", 60 * 60)
                .clamp(MIN_INTERVAL, MAX_EXPIRATION),
            cleanup_normal_only: flag("SWEEP_CLEANUP_NORMAL_ONLY", true),
            notify_recipients,
            delivery_key: get_or("SENDGRID_API_KEY", "SWEEP_DELIVERY_KEY"),
            notify_from: get("SWEEP_NOTIFY_FROM")
                .unwrap_or_else(|| "agenda-sweeper@localhost".to_string()),
            environment: get_or("SWEEP_ENV", "ENV"),
            migrate_on_startup: flag("SWEEP_MIGRATE_ON_STARTUP", false),
            db_max_connections,
            db_acquire_timeout,
            log_json: flag("SWEEP_LOG_JSON", false),
        })
    }

    pub fn expiration_policy(&self) -> anyhow::Result<crate::jobs::ExpirationPolicy> {
        let duration = chrono::Duration::from_std(self.expiration)?;
        Ok(crate::jobs::ExpirationPolicy::new(duration))
    }

    /// Notifications run only with at least one recipient and a credential.
    pub fn notify_settings(&self) -> Result<NotifySettings, NotifyDisabled> {
        if self.notify_recipients.is_empty() {
            return Err(NotifyDisabled::NoRecipients);
        }
        let delivery_key = self
            .delivery_key
            .clone()
            .ok_or(NotifyDisabled::NoCredential)?;

        Ok(NotifySettings {
            recipients: self.notify_recipients.clone(),
            delivery_key,
            from: self.notify_from.clone(),
            environment: self.environment.clone(),
        })
    }
}

pub fn parse_recipients(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for r in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !out.iter().any(|seen| seen == r) {
            out.push(r.to_string());
        }
    }
    out
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Collection names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> anyhow::Result<String> {
    let name = name.trim();
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !first_ok || !rest_ok || name.len() > 63 {
        anyhow::bail!("invalid collection name: {name:?}");
    }
    Ok(name.to_string())
}
