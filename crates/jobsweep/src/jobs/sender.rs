//! Outbound delivery of failure notifications.

use async_trait::async_trait;
use tracing::debug;

pub const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Sends one message to one recipient.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// SendGrid v3 mail API.
pub struct SendGridSender {
    api_key: String,
    from: String,
    endpoint: String,
    client: reqwest::Client,
}

impl SendGridSender {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from: from.into(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different API host (sandbox, relay).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn payload(&self, recipient: &str, subject: &str, body: &str) -> serde_json::Value {
        serde_json::json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }]
        })
    }
}

#[async_trait]
impl NotificationSender for SendGridSender {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.payload(recipient, subject, body))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(recipient, "notification accepted");
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Rejected { status, body })
        }
    }
}
