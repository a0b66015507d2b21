use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, instrument};

use crate::monitors::AlertRequest;
use crate::notifier::{Notifier, NotifyError};
use crate::storage::schema::format_value;
use crate::util::format_pretty_timestamp;

/// Rendered alert, ready for a [`Notifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

impl From<&AlertRequest> for Notification {
    fn from(request: &AlertRequest) -> Self {
        match request {
            AlertRequest::OutOfRange {
                node_id,
                parameter,
                expected,
                measurements,
                timestamp,
                ..
            } => {
                let expected_line = format!(
                    "Expected {parameter} range: {} to {} {}",
                    format_value(expected.min),
                    format_value(expected.max),
                    parameter.units()
                );

                Notification {
                    subject: format!("LWQMS ALERT: {parameter} out of range at Node {node_id}"),
                    body: format!(
                        "Node {node_id} has {parameter} out of range.\n\n\
                         Timestamp: {}\n\
                         pH: {}\n\
                         Temperature: {} °C\n\
                         Turbidity: {} NTU\n\n\
                         {}",
                        format_pretty_timestamp(timestamp),
                        format_value(measurements.ph),
                        format_value(measurements.temperature_c),
                        format_value(measurements.turbidity_ntu),
                        expected_line.trim_end()
                    ),
                }
            }
            AlertRequest::Offline {
                node_id,
                last_seen,
                timeout_minutes,
            } => Notification {
                subject: format!("LWQMS ALERT: Node {node_id} Offline"),
                body: format!(
                    "Node {node_id} has not sent data for over {timeout_minutes} minutes.\n\n\
                     Last received timestamp: {}\n\
                     Please check the node's connectivity and power status.",
                    format_pretty_timestamp(last_seen)
                ),
            },
        }
    }
}

/// Sends alert requests through the configured notifier
///
/// Every delivery runs under a timeout. Failures are logged and dropped, the
/// engine's flags are not touched, so a failed alert is not sent again until
/// the next excursion.
#[derive(Clone)]
pub struct AlertManager {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl AlertManager {
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Deliver all requests concurrently, returns how many were delivered.
    #[instrument(skip_all, fields(count = requests.len()))]
    pub async fn dispatch(&self, requests: &[AlertRequest]) -> usize {
        let deliveries = requests.iter().map(|request| async move {
            let notification = Notification::from(request);
            match self.send(&notification).await {
                Ok(()) => {
                    info!("sent alert: {}", notification.subject);
                    true
                }
                Err(e) => {
                    error!("failed to send alert {:?}: {}", notification.subject, e);
                    false
                }
            }
        });

        join_all(deliveries)
            .await
            .into_iter()
            .filter(|delivered| *delivered)
            .count()
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tokio::time::timeout(
            self.timeout,
            self.notifier.send(&notification.subject, &notification.body),
        )
        .await
        .map_err(|_| NotifyError::TimedOut(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::{Parameter, Range};
    use crate::storage::schema::Measurements;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
            if subject.contains("Node 9") {
                return Err(NotifyError::Transport("connection refused".to_string()));
            }
            self.sent.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn send(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    fn out_of_range(node_id: u32) -> AlertRequest {
        AlertRequest::OutOfRange {
            node_id,
            parameter: Parameter::Ph,
            value: 9.1,
            expected: Range::new(6.5, 8.5),
            measurements: Measurements {
                ph: 9.1,
                temperature_c: 23.0,
                turbidity_ntu: 0.00045,
            },
            timestamp: "not a timestamp".to_string(),
        }
    }

    #[test]
    fn test_out_of_range_notification_text() {
        let notification = Notification::from(&out_of_range(1));

        assert_eq!(notification.subject, "LWQMS ALERT: pH out of range at Node 1");
        assert_eq!(
            notification.body,
            "Node 1 has pH out of range.\n\n\
             Timestamp: not a timestamp\n\
             pH: 9.1\n\
             Temperature: 23.0 °C\n\
             Turbidity: 0.00045 NTU\n\n\
             Expected pH range: 6.5 to 8.5"
        );
    }

    #[test]
    fn test_offline_notification_text() {
        let notification = Notification::from(&AlertRequest::Offline {
            node_id: 2,
            last_seen: "".to_string(),
            timeout_minutes: 15.5,
        });

        assert_eq!(notification.subject, "LWQMS ALERT: Node 2 Offline");
        assert_eq!(
            notification.body,
            "Node 2 has not sent data for over 15.5 minutes.\n\n\
             Last received timestamp: N/A\n\
             Please check the node's connectivity and power status."
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_other_deliveries() {
        let notifier = Arc::new(Recording::default());
        let manager = AlertManager::new(notifier.clone(), Duration::from_secs(1));

        let delivered = manager
            .dispatch(&[out_of_range(1), out_of_range(9), out_of_range(2)])
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_notifier_times_out() {
        let manager = AlertManager::new(Arc::new(Stalled), Duration::from_secs(30));

        let delivered = manager.dispatch(&[out_of_range(1)]).await;

        assert_eq!(delivered, 0);
    }
}
