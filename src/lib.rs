pub mod actors;
pub mod alerts;
pub mod config;
pub mod monitors;
pub mod notifier;
pub mod protocol;
pub mod simulation;
pub mod storage;
pub mod transport;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a remote sensor node as sent in the `[..]` of a packet.
pub type NodeId = u32;

/// One decoded telemetry sample.
///
/// The timestamp is assigned by the gateway when the line is decoded, the
/// nodes do not carry a clock of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: DateTime<Utc>,
    pub node_id: NodeId,
    pub ph: f64,
    pub temperature_c: f64,
    pub turbidity_ntu: f64,
}

/// Free-text diagnostic line sent by a node (e.g. "Transmitter Ready").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMessage {
    pub timestamp: DateTime<Utc>,
    pub node_id: NodeId,
    pub text: String,
}

/// Anything the line decoder can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Reading(SensorReading),
    Message(NodeMessage),
}

impl Event {
    pub fn node_id(&self) -> NodeId {
        match self {
            Event::Reading(reading) => reading.node_id,
            Event::Message(message) => message.node_id,
        }
    }
}
