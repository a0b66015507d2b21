//! Event store trait definition
//!
//! This module defines the core `EventStore` trait that all
//! storage implementations must implement.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{MessageRow, ReadingRow};
use crate::{NodeId, NodeMessage, SensorReading};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Latest stored reading per requested node, `None` for nodes that never
/// reported.
pub type LatestByNode = BTreeMap<NodeId, Option<ReadingRow>>;

/// Append-only log of readings and node messages
///
/// ## Contract
///
/// - **Durable appends**: an append has reached stable storage when it
///   returns. A crash in the middle of an append must not damage records that
///   were committed before it.
/// - **Whole records**: concurrent appends are serialized per record, readers
///   never see half of a row.
/// - **Stored order**: "latest" and "history" follow the order in which rows
///   were appended, not their timestamps.
///
/// Implementations must be `Send + Sync`, the ingest and simulator actors
/// append through the same `Arc<dyn EventStore>`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one sensor reading
    async fn append_reading(&self, reading: &SensorReading) -> StorageResult<()>;

    /// Persist one node message
    async fn append_message(&self, message: &NodeMessage) -> StorageResult<()>;

    /// All readings in stored order
    async fn readings(&self) -> StorageResult<Vec<ReadingRow>>;

    /// All readings of one node, oldest first
    ///
    /// Callers that want newest-first have to reverse the result.
    async fn history_for_node(&self, node_id: NodeId) -> StorageResult<Vec<ReadingRow>> {
        Ok(self
            .readings()
            .await?
            .into_iter()
            .filter(|row| row.node_id == node_id)
            .collect())
    }

    /// The most recent reading of each requested node
    ///
    /// When a node appears several times, the row appended last wins, even if
    /// its timestamp is older.
    async fn latest_by_node(&self, nodes: &[NodeId]) -> StorageResult<LatestByNode> {
        let rows = self.readings().await?;
        Ok(latest_in(rows, nodes))
    }

    /// All messages of one node, oldest first
    async fn messages_for_node(&self, node_id: NodeId) -> StorageResult<Vec<MessageRow>>;

    /// Check backend health
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

/// Scan rows in stored order and keep the last one per requested node.
pub fn latest_in(rows: impl IntoIterator<Item = ReadingRow>, nodes: &[NodeId]) -> LatestByNode {
    let mut latest: LatestByNode = nodes.iter().map(|node| (*node, None)).collect();

    for row in rows {
        if let Some(slot) = latest.get_mut(&row.node_id) {
            *slot = Some(row);
        }
    }

    latest
}
