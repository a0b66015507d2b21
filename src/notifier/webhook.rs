use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{info, instrument};

use super::{Notifier, NotifyError};

/// Posts `{ "subject", "message", "timestamp" }` to a URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    #[instrument(skip_all, fields(subject = subject))]
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = json!({
            "subject": subject,
            "message": body,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }

        info!("successfully sent webhook alert");
        Ok(())
    }
}
