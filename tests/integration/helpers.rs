//! Helper functions for integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lwqms_gateway::{
    NodeId, SensorReading,
    actors::{alert::AlertHandle, ingest::LineReceiver},
    alerts::AlertManager,
    monitors::AlertEngine,
    notifier::{Notifier, NotifyError},
    storage::{CsvStore, EventStore},
    transport::TransportError,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Notifier that remembers what it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub fn csv_store(dir: &TempDir) -> CsvStore {
    CsvStore::open(dir.path().join("payloads.csv"), dir.path().join("messages.csv")).unwrap()
}

pub fn reading(node_id: NodeId, timestamp: DateTime<Utc>, ph: f64) -> SensorReading {
    SensorReading {
        timestamp,
        node_id,
        ph,
        temperature_c: 22.5,
        turbidity_ntu: 0.2,
    }
}

/// Line channel for the ingest actor, sender kept by the caller
pub fn line_channel() -> (mpsc::Sender<Result<String, TransportError>>, LineReceiver) {
    mpsc::channel(64)
}

/// Alert actor with default thresholds that only runs on `evaluate_now`
pub fn spawn_alerts(
    store: Arc<dyn EventStore>,
    notifier: Arc<dyn Notifier>,
    nodes: Vec<NodeId>,
) -> AlertHandle {
    AlertHandle::spawn(
        AlertEngine::default(),
        store,
        AlertManager::new(notifier, Duration::from_secs(5)),
        nodes,
        Duration::from_secs(3600),
    )
}
