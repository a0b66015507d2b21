//! Alert evaluation
//!
//! [`AlertEngine`] turns the latest reading of each node into alert
//! requests. It never touches the store or the notifier itself.

pub mod engine;
pub mod evaluation;
pub mod thresholds;

pub use engine::{AlertEngine, AlertKey, AlertRequest, DEFAULT_LIVENESS_TIMEOUT_MINUTES};
pub use evaluation::AlertEvaluation;
pub use thresholds::{Parameter, Range, ThresholdError, Thresholds};
