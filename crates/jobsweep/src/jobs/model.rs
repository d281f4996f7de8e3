use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Job document as stored by the execution engine.
///
/// The engine owns the document shape, so timestamps stay as raw JSON until a
/// sweep needs them. `null` is normalised to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub job_type: JobType,
    pub last_finished_at: Option<Value>,
    pub failed_at: Option<Value>,
    pub document: Value,
}

impl JobRecord {
    pub fn from_document(id: Uuid, document: Value) -> Self {
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let job_type = document
            .get("type")
            .and_then(Value::as_str)
            .map(JobType::from_str)
            .unwrap_or(JobType::Other(String::new()));

        Self {
            id,
            name,
            job_type,
            last_finished_at: present(&document, "lastFinishedAt"),
            failed_at: present(&document, "failedAt"),
            document,
        }
    }

    /// Failed iff both timestamps are present and denote the same instant.
    /// Values that do not parse must match exactly.
    pub fn is_failed(&self) -> bool {
        match (&self.last_finished_at, &self.failed_at) {
            (Some(finished), Some(failed)) => {
                match (parse_timestamp(finished), parse_timestamp(failed)) {
                    (Some(a), Some(b)) => a == b,
                    _ => finished == failed,
                }
            }
            _ => false,
        }
    }

    pub fn finished(&self) -> Finished {
        match &self.last_finished_at {
            None => Finished::Pending,
            Some(raw) => match parse_timestamp(raw) {
                Some(at) => Finished::At(at),
                None => Finished::Invalid,
            },
        }
    }
}

fn present(document: &Value, field: &str) -> Option<Value> {
    document.get(field).filter(|v| !v.is_null()).cloned()
}

/// Outcome of reading `lastFinishedAt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    Pending,
    Invalid,
    At(DateTime<Utc>),
}

/// Accepts RFC 3339 strings and integer epoch milliseconds.
pub fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Canonical text of a raw timestamp, used as the failure half of the ledger key.
pub fn timestamp_key(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    Normal,
    /// Recurring jobs (`every(...)`) are stored with type "single".
    Single,
    Other(String),
}

impl JobType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "normal" => JobType::Normal,
            "single" => JobType::Single,
            other => JobType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobType::Normal => "normal",
            JobType::Single => "single",
            JobType::Other(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFilter {
    All,
    Normal,
    Failed,
}

impl JobFilter {
    pub fn matches(&self, job: &JobRecord) -> bool {
        match self {
            JobFilter::All => true,
            JobFilter::Normal => job.job_type == JobType::Normal,
            JobFilter::Failed => job.is_failed(),
        }
    }
}

/// Dedup key: one notification per distinct failure occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub job_id: Uuid,
    pub failed_at: String,
}

impl NotificationKey {
    pub fn new(job_id: Uuid, failed_at: &Value) -> Self {
        Self {
            job_id,
            failed_at: timestamp_key(failed_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub key: NotificationKey,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub delivered: i32,
    pub notified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExpirationPolicy {
    pub duration: chrono::Duration,
}

impl ExpirationPolicy {
    pub fn new(duration: chrono::Duration) -> Self {
        Self { duration }
    }

    /// `None` when `now - duration` falls outside the representable range.
    pub fn threshold(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(self.duration)
    }
}

impl Default for ExpirationPolicy {
    fn default() -> Self {
        Self::new(chrono::Duration::hours(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failed_requires_equal_timestamps() {
        let id = Uuid::new_v4();
        let failed = JobRecord::from_document(
            id,
            json!({"name": "a", "type": "normal",
                   "lastFinishedAt": "2024-05-01T10:00:00Z", "failedAt": "2024-05-01T10:00:00Z"}),
        );
        assert!(failed.is_failed());

        let recovered = JobRecord::from_document(
            id,
            json!({"name": "a", "type": "normal",
                   "lastFinishedAt": "2024-05-01T11:00:00Z", "failedAt": "2024-05-01T10:00:00Z"}),
        );
        assert!(!recovered.is_failed());

        let never_ran = JobRecord::from_document(id, json!({"name": "a", "failedAt": null}));
        assert!(!never_ran.is_failed());
    }

    #[test]
    fn failed_compares_instants_not_representations() {
        let id = Uuid::new_v4();
        let millis_precision = JobRecord::from_document(
            id,
            json!({"lastFinishedAt": "2024-05-01T10:00:00.000Z", "failedAt": "2024-05-01T10:00:00Z"}),
        );
        assert!(millis_precision.is_failed());

        let mixed_forms = JobRecord::from_document(
            id,
            json!({"lastFinishedAt": 1_714_557_600_000_i64, "failedAt": "2024-05-01T12:00:00+02:00"}),
        );
        assert!(mixed_forms.is_failed());

        let unparsable_but_equal =
            JobRecord::from_document(id, json!({"lastFinishedAt": "x", "failedAt": "x"}));
        assert!(unparsable_but_equal.is_failed());

        let unparsable_and_different =
            JobRecord::from_document(id, json!({"lastFinishedAt": "x", "failedAt": "2024-05-01T10:00:00Z"}));
        assert!(!unparsable_and_different.is_failed());
    }

    #[test]
    fn threshold_is_none_when_out_of_range() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let policy = ExpirationPolicy::default();
        assert_eq!(
            policy.threshold(now),
            Some(now - chrono::Duration::hours(1))
        );

        let huge = ExpirationPolicy::new(chrono::Duration::seconds(1_000_000_000_000_000));
        assert_eq!(huge.threshold(now), None);
    }

    #[test]
    fn finished_distinguishes_pending_invalid_and_valid() {
        let id = Uuid::new_v4();
        let pending = JobRecord::from_document(id, json!({"lastFinishedAt": null}));
        assert_eq!(pending.finished(), Finished::Pending);

        let invalid = JobRecord::from_document(id, json!({"lastFinishedAt": "yesterday"}));
        assert_eq!(invalid.finished(), Finished::Invalid);

        let millis = JobRecord::from_document(id, json!({"lastFinishedAt": 1_714_557_600_000_i64}));
        let expected = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(millis.finished(), Finished::At(expected));
    }

    #[test]
    fn job_type_tags() {
        assert_eq!(JobType::from_str("normal"), JobType::Normal);
        assert_eq!(JobType::from_str("single"), JobType::Single);
        assert_eq!(JobType::from_str("nested").as_str(), "nested");

        let untyped = JobRecord::from_document(Uuid::new_v4(), json!({"name": "x"}));
        assert!(!JobFilter::Normal.matches(&untyped));
        assert!(JobFilter::All.matches(&untyped));
    }

    #[test]
    fn key_text_is_stable_for_strings_and_numbers() {
        let id = Uuid::new_v4();
        assert_eq!(
            NotificationKey::new(id, &json!("2024-05-01T10:00:00Z")).failed_at,
            "2024-05-01T10:00:00Z"
        );
        assert_eq!(NotificationKey::new(id, &json!(42)).failed_at, "42");
    }
}
