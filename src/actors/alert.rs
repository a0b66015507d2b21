//! AlertActor - Polls the event store and sends alerts
//!
//! ## Cycle
//!
//! ```text
//! Timer tick → latest_by_node(nodes) → AlertEngine::evaluate_latest → AlertManager::dispatch
//!     ↑
//!     └─── Commands (EvaluateNow, Get/SetThresholds, GetActiveAlerts, GetStatus, Shutdown)
//! ```
//!
//! A cycle whose store query fails is skipped. The engine state is not
//! touched, so nothing is raised or cleared for that cycle.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use crate::NodeId;
use crate::alerts::AlertManager;
use crate::monitors::{AlertEngine, AlertKey, Thresholds};
use crate::storage::EventStore;

use super::messages::{AlertCommand, CycleOutcome};

pub struct AlertActor {
    engine: AlertEngine,
    store: Arc<dyn EventStore>,
    alert_manager: AlertManager,

    /// Nodes whose latest reading is evaluated
    nodes: Vec<NodeId>,

    poll_interval: Duration,
    command_rx: mpsc::Receiver<AlertCommand>,
}

impl AlertActor {
    pub fn new(
        engine: AlertEngine,
        store: Arc<dyn EventStore>,
        alert_manager: AlertManager,
        nodes: Vec<NodeId>,
        poll_interval: Duration,
        command_rx: mpsc::Receiver<AlertCommand>,
    ) -> Self {
        Self {
            engine,
            store,
            alert_manager,
            nodes,
            poll_interval,
            command_rx,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        // first cycle one interval after startup, callers can evaluate earlier
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evaluate().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AlertCommand::EvaluateNow { respond_to } => {
                            let outcome = self.evaluate().await;
                            let _ = respond_to.send(outcome);
                        }
                        AlertCommand::GetThresholds { respond_to } => {
                            let _ = respond_to.send(self.engine.thresholds());
                        }
                        AlertCommand::SetThresholds { thresholds, respond_to } => {
                            let result = self.engine.set_thresholds(thresholds);
                            if let Err(e) = &result {
                                warn!("rejected thresholds: {e}");
                            }
                            let _ = respond_to.send(result);
                        }
                        AlertCommand::GetActiveAlerts { respond_to } => {
                            let _ = respond_to.send(self.engine.active_alerts());
                        }
                        AlertCommand::GetStatus { respond_to } => {
                            let _ = respond_to.send(self.engine.status_summary());
                        }
                        AlertCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("alert actor stopped");
    }

    async fn evaluate(&mut self) -> CycleOutcome {
        let latest = match self.store.latest_by_node(&self.nodes).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!("event store unavailable, skipping alert cycle: {e}");
                return CycleOutcome::StoreUnavailable(e.to_string());
            }
        };

        let requests = self.engine.evaluate_latest(&latest, Utc::now());
        let delivered = if requests.is_empty() {
            0
        } else {
            self.alert_manager.dispatch(&requests).await
        };

        trace!("alert cycle: {} raised, {} delivered", requests.len(), delivered);

        CycleOutcome::Evaluated {
            raised: requests.len(),
            delivered,
        }
    }
}

/// Handle for controlling the AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    pub fn spawn(
        engine: AlertEngine,
        store: Arc<dyn EventStore>,
        alert_manager: AlertManager,
        nodes: Vec<NodeId>,
        poll_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = AlertActor::new(engine, store, alert_manager, nodes, poll_interval, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> AlertCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .context("failed to send command to alert actor")?;

        rx.await.context("failed to receive response")
    }

    /// Run one evaluation cycle immediately
    pub async fn evaluate_now(&self) -> Result<CycleOutcome> {
        self.request(|respond_to| AlertCommand::EvaluateNow { respond_to })
            .await
    }

    pub async fn thresholds(&self) -> Result<Thresholds> {
        self.request(|respond_to| AlertCommand::GetThresholds { respond_to })
            .await
    }

    /// Fails with a [`ThresholdError`](crate::monitors::ThresholdError) when
    /// the thresholds are rejected.
    pub async fn set_thresholds(&self, thresholds: Thresholds) -> Result<()> {
        self.request(|respond_to| AlertCommand::SetThresholds {
            thresholds,
            respond_to,
        })
        .await??;
        Ok(())
    }

    pub async fn active_alerts(&self) -> Result<Vec<AlertKey>> {
        self.request(|respond_to| AlertCommand::GetActiveAlerts { respond_to })
            .await
    }

    pub async fn status(&self) -> Result<String> {
        self.request(|respond_to| AlertCommand::GetStatus { respond_to })
            .await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(AlertCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitors::{Parameter, Range, ThresholdError};
    use crate::notifier::{Notifier, NotifyError};
    use crate::storage::{HealthStatus, MemoryStore, MessageRow, ReadingRow, StorageError, StorageResult};
    use crate::{NodeMessage, SensorReading};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        subjects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn send(&self, subject: &str, _body: &str) -> Result<(), NotifyError> {
            self.subjects.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    struct Unavailable;

    #[async_trait]
    impl EventStore for Unavailable {
        async fn append_reading(&self, _reading: &SensorReading) -> StorageResult<()> {
            Ok(())
        }
        async fn append_message(&self, _message: &NodeMessage) -> StorageResult<()> {
            Ok(())
        }
        async fn readings(&self) -> StorageResult<Vec<ReadingRow>> {
            Err(StorageError::Csv("log file missing".to_string()))
        }
        async fn messages_for_node(&self, _node_id: NodeId) -> StorageResult<Vec<MessageRow>> {
            Ok(Vec::new())
        }
        async fn health_check(&self) -> StorageResult<HealthStatus> {
            unimplemented!()
        }
        async fn close(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn reading(node_id: NodeId, ph: f64) -> SensorReading {
        SensorReading {
            timestamp: Utc::now(),
            node_id,
            ph,
            temperature_c: 21.0,
            turbidity_ntu: 0.3,
        }
    }

    fn spawn(store: Arc<dyn EventStore>, notifier: Arc<Recording>) -> AlertHandle {
        AlertHandle::spawn(
            AlertEngine::default(),
            store,
            AlertManager::new(notifier, Duration::from_secs(5)),
            vec![1, 2],
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_excursion_notifies_once() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(Recording::default());
        let handle = spawn(store.clone(), notifier.clone());

        store.append_reading(&reading(1, 9.2)).await.unwrap();

        assert_eq!(
            handle.evaluate_now().await.unwrap(),
            CycleOutcome::Evaluated { raised: 1, delivered: 1 }
        );
        assert_eq!(
            handle.evaluate_now().await.unwrap(),
            CycleOutcome::Evaluated { raised: 0, delivered: 0 }
        );

        assert_eq!(
            notifier.subjects.lock().unwrap().as_slice(),
            ["LWQMS ALERT: pH out of range at Node 1"]
        );
        assert_eq!(
            handle.active_alerts().await.unwrap(),
            vec![AlertKey { node_id: 1, parameter: Parameter::Ph }]
        );

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_threshold_update_and_rejection() {
        let store = Arc::new(MemoryStore::new());
        let handle = spawn(store, Arc::new(Recording::default()));

        let narrow = Thresholds {
            ph: Range::new(7.0, 7.5),
            ..Thresholds::default()
        };
        handle.set_thresholds(narrow).await.unwrap();
        assert_eq!(handle.thresholds().await.unwrap(), narrow);

        let inverted = Thresholds {
            ph: Range::new(8.0, 7.0),
            ..Thresholds::default()
        };
        let err = handle.set_thresholds(inverted).await.unwrap_err();
        assert!(err.downcast_ref::<ThresholdError>().is_some());
        assert_eq!(handle.thresholds().await.unwrap(), narrow);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_skips_cycle() {
        let notifier = Arc::new(Recording::default());
        let handle = spawn(Arc::new(Unavailable), notifier.clone());

        let outcome = handle.evaluate_now().await.unwrap();

        assert!(matches!(outcome, CycleOutcome::StoreUnavailable(_)));
        assert_eq!(handle.status().await.unwrap(), "Status: All readings normal");
        assert!(notifier.subjects.lock().unwrap().is_empty());

        handle.shutdown().await.unwrap();
    }
}
