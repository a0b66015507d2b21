//! SMTP notifier
//!
//! The password is never part of the configuration file, it is read from the
//! environment (see [`crate::util::get_smtp_password`]).

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument, warn};

use super::{Notifier, NotifyError};
use crate::config::EmailConfig;

#[derive(Debug)]
pub struct EmailNotifier {
    from: Mailbox,
    to: Mailbox,
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailNotifier {
    /// Without a password the notifier is created but every send fails with
    /// [`NotifyError::NotConfigured`].
    pub fn new(config: &EmailConfig, password: Option<String>) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .sender
            .parse()
            .map_err(|e| NotifyError::InvalidMessage(format!("invalid sender address: {e}")))?;
        let to: Mailbox = config
            .recipient
            .parse()
            .map_err(|e| NotifyError::InvalidMessage(format!("invalid recipient address: {e}")))?;

        let mailer = match password {
            Some(password) => {
                let creds = Credentials::new(config.sender.clone(), password);
                let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                    .map_err(|e| NotifyError::Transport(e.to_string()))?
                    .port(config.smtp_port)
                    .credentials(creds)
                    .build();
                Some(mailer)
            }
            None => {
                warn!("no SMTP password set, alert emails will not be sent");
                None
            }
        };

        Ok(Self { from, to, mailer })
    }

    fn build(&self, subject: &str, body: &str) -> Result<Message, NotifyError> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| NotifyError::InvalidMessage(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    #[instrument(skip_all, fields(subject = subject))]
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let Some(mailer) = &self.mailer else {
            return Err(NotifyError::NotConfigured(
                "missing SMTP password".to_string(),
            ));
        };

        let email = self.build(subject, body)?;

        mailer
            .send(email)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        info!(to = %self.to, "alert email sent");
        Ok(())
    }
}
