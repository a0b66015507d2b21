//! Delivery of alert notifications
//!
//! The alert loop only knows the [`Notifier`] trait. Adapters:
//!
//! - [`email::EmailNotifier`]: SMTP with STARTTLS
//! - [`webhook::WebhookNotifier`]: JSON POST to an HTTP endpoint
//! - [`LogNotifier`]: writes the notification to the log, for bench setups

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

pub mod email;
pub mod webhook;

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;

use crate::config::NotifierConfig;
use crate::util::get_smtp_password;

#[derive(Debug)]
pub enum NotifyError {
    /// Required settings (credentials, addresses) are missing
    NotConfigured(String),

    /// The message could not be built
    InvalidMessage(String),

    /// The transport failed to deliver
    Transport(String),

    /// The receiving endpoint answered with a non-success status
    Rejected(u16),

    TimedOut(Duration),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::NotConfigured(msg) => write!(f, "notifier not configured: {}", msg),
            NotifyError::InvalidMessage(msg) => write!(f, "invalid notification: {}", msg),
            NotifyError::Transport(msg) => write!(f, "delivery failed: {}", msg),
            NotifyError::Rejected(status) => {
                write!(f, "endpoint rejected notification with status {}", status)
            }
            NotifyError::TimedOut(after) => {
                write!(f, "delivery timed out after {}s", after.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for NotifyError {}

/// Sink for alert notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        warn!("{subject}\n{body}");
        Ok(())
    }
}

/// Build the configured notifier. SMTP credentials come from the environment.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    let notifier: Arc<dyn Notifier> = match config {
        NotifierConfig::Email(email) => Arc::new(EmailNotifier::new(email, get_smtp_password())?),
        NotifierConfig::Webhook(webhook) => Arc::new(WebhookNotifier::new(webhook.url.clone())),
        NotifierConfig::Log => Arc::new(LogNotifier),
    };
    Ok(notifier)
}
