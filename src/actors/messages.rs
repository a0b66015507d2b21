//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Request/Response**: oneshot channels carry the answer back

use tokio::sync::oneshot;

use crate::SensorReading;
use crate::monitors::{AlertKey, ThresholdError, Thresholds};
use crate::storage::StorageResult;

/// Commands that can be sent to the IngestActor
#[derive(Debug)]
pub enum IngestCommand {
    GetStats {
        respond_to: oneshot::Sender<IngestStats>,
    },

    /// Stop reading; lines still buffered are dropped
    Shutdown,
}

/// Counters of the ingest loop since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub lines_received: u64,
    pub readings_stored: u64,
    pub messages_stored: u64,
    /// Lines that matched neither packet grammar
    pub decode_errors: u64,
    /// Decoded events that could not be appended
    pub storage_errors: u64,
}

/// Commands that can be sent to a SimulatorActor
#[derive(Debug)]
pub enum SimulatorCommand {
    /// Produce and store one sample immediately (bypassing the interval timer)
    SampleNow {
        respond_to: oneshot::Sender<StorageResult<SensorReading>>,
    },

    Shutdown,
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Run one evaluation cycle now
    EvaluateNow {
        respond_to: oneshot::Sender<CycleOutcome>,
    },

    GetThresholds {
        respond_to: oneshot::Sender<Thresholds>,
    },

    /// Replace the thresholds, effective from the next cycle
    SetThresholds {
        thresholds: Thresholds,
        respond_to: oneshot::Sender<Result<(), ThresholdError>>,
    },

    GetActiveAlerts {
        respond_to: oneshot::Sender<Vec<AlertKey>>,
    },

    /// Status bar text
    GetStatus {
        respond_to: oneshot::Sender<String>,
    },

    /// Gracefully shut down the alert actor
    Shutdown,
}

/// Result of one alert cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Evaluated {
        /// Alerts that went from inactive to active
        raised: usize,
        /// Notifications the notifier accepted
        delivered: usize,
    },

    /// The latest-row query failed, nothing was evaluated
    StoreUnavailable(String),
}
