//! In-memory event store (no persistence)
//!
//! Useful for:
//! - Testing without touching the file system
//! - Running the pipeline with `"backend": "none"`
//!
//! All data is lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{EventStore, HealthStatus};
use super::error::StorageResult;
use super::schema::{MessageRow, ReadingRow};
use crate::{NodeId, NodeMessage, SensorReading};

#[derive(Debug, Default)]
struct Logs {
    readings: Vec<ReadingRow>,
    messages: Vec<MessageRow>,
}

/// In-memory event store
///
/// Rows are formatted exactly like the persistent backends format them, so
/// tests against this store see the same text values.
#[derive(Debug, Default)]
pub struct MemoryStore {
    logs: RwLock<Logs>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append_reading(&self, reading: &SensorReading) -> StorageResult<()> {
        self.logs
            .write()
            .await
            .readings
            .push(ReadingRow::from_reading(reading));
        Ok(())
    }

    async fn append_message(&self, message: &NodeMessage) -> StorageResult<()> {
        self.logs
            .write()
            .await
            .messages
            .push(MessageRow::from_message(message));
        Ok(())
    }

    async fn readings(&self) -> StorageResult<Vec<ReadingRow>> {
        Ok(self.logs.read().await.readings.clone())
    }

    async fn messages_for_node(&self, node_id: NodeId) -> StorageResult<Vec<MessageRow>> {
        Ok(self
            .logs
            .read()
            .await
            .messages
            .iter()
            .filter(|row| row.node_id == node_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let logs = self.logs.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("readings".to_string(), logs.readings.len().to_string()),
                ("messages".to_string(), logs.messages.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory store (no-op)");
        Ok(())
    }
}
