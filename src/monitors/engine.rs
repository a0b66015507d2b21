//! Hysteresis and liveness state of all nodes
//!
//! The engine keeps one flag per `(node, parameter)` and is fed the latest
//! stored reading of each node. A notification is requested only when a flag
//! goes from inactive to active. Flags live in memory and start out inactive
//! after every restart.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, instrument, trace};

use super::evaluation::AlertEvaluation;
use super::thresholds::{Parameter, Range, ThresholdError, Thresholds};
use crate::NodeId;
use crate::storage::LatestByNode;
use crate::storage::schema::{Measurements, ReadingRow};

pub const DEFAULT_LIVENESS_TIMEOUT_MINUTES: f64 = 15.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AlertKey {
    pub node_id: NodeId,
    pub parameter: Parameter,
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {} {}", self.node_id, self.parameter)
    }
}

/// A transition into the abnormal state that has to be reported
#[derive(Debug, Clone, PartialEq)]
pub enum AlertRequest {
    OutOfRange {
        node_id: NodeId,
        parameter: Parameter,
        value: f64,
        expected: Range,
        measurements: Measurements,
        /// Timestamp of the reading as stored
        timestamp: String,
    },
    Offline {
        node_id: NodeId,
        last_seen: String,
        timeout_minutes: f64,
    },
}

impl AlertRequest {
    pub fn key(&self) -> AlertKey {
        match self {
            AlertRequest::OutOfRange {
                node_id, parameter, ..
            } => AlertKey {
                node_id: *node_id,
                parameter: *parameter,
            },
            AlertRequest::Offline { node_id, .. } => AlertKey {
                node_id: *node_id,
                parameter: Parameter::Liveness,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    thresholds: Thresholds,
    liveness_timeout_minutes: f64,
    active: HashMap<AlertKey, bool>,
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            liveness_timeout_minutes: DEFAULT_LIVENESS_TIMEOUT_MINUTES,
            active: HashMap::new(),
        }
    }
}

impl AlertEngine {
    /// Fails on invalid thresholds or a liveness timeout that is not a
    /// positive, finite number of minutes.
    pub fn new(thresholds: Thresholds, liveness_timeout_minutes: f64) -> Result<Self, ThresholdError> {
        thresholds.validate()?;

        if !(liveness_timeout_minutes.is_finite() && liveness_timeout_minutes > 0.0) {
            return Err(ThresholdError::LivenessTimeout(liveness_timeout_minutes));
        }

        Ok(Self {
            thresholds,
            liveness_timeout_minutes,
            active: HashMap::new(),
        })
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Replace the thresholds. Takes effect on the next evaluation, existing
    /// flags are kept.
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> Result<(), ThresholdError> {
        thresholds.validate()?;
        debug!("thresholds updated: {thresholds:?}");
        self.thresholds = thresholds;
        Ok(())
    }

    pub fn liveness_timeout_minutes(&self) -> f64 {
        self.liveness_timeout_minutes
    }

    fn liveness_timeout(&self) -> TimeDelta {
        TimeDelta::milliseconds((self.liveness_timeout_minutes * 60_000.0).round() as i64)
    }

    /// Active keys, ordered by node and parameter
    pub fn active_alerts(&self) -> Vec<AlertKey> {
        let mut keys = self
            .active
            .iter()
            .filter_map(|(key, active)| active.then_some(*key))
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn is_active(&self, key: &AlertKey) -> bool {
        self.active.get(key).copied().unwrap_or(false)
    }

    /// Evaluate the latest reading of every node. Nodes that never reported
    /// are skipped.
    #[instrument(skip_all)]
    pub fn evaluate_latest(&mut self, latest: &LatestByNode, now: DateTime<Utc>) -> Vec<AlertRequest> {
        latest
            .values()
            .flatten()
            .flat_map(|row| self.evaluate(row, now))
            .collect()
    }

    /// Evaluate one node's latest reading.
    ///
    /// Unparsable measurements skip the range checks, an unparsable timestamp
    /// skips the liveness check. Neither changes any flag.
    pub fn evaluate(&mut self, row: &ReadingRow, now: DateTime<Utc>) -> Vec<AlertRequest> {
        let mut requests = Vec::new();

        match row.measurements() {
            Ok(measurements) => {
                for parameter in Parameter::MEASURED {
                    if let Some(request) = self.check_range(row, parameter, &measurements) {
                        requests.push(request);
                    }
                }
            }
            Err(e) => debug!("node {}: skipping range checks, {e}", row.node_id),
        }

        match row.captured_at() {
            Ok(captured_at) => {
                if let Some(request) = self.check_liveness(row, captured_at, now) {
                    requests.push(request);
                }
            }
            Err(e) => debug!("node {}: skipping liveness check, {e}", row.node_id),
        }

        requests
    }

    fn check_range(
        &mut self,
        row: &ReadingRow,
        parameter: Parameter,
        measurements: &Measurements,
    ) -> Option<AlertRequest> {
        let (Some(range), Some(value)) = (
            self.thresholds.range(parameter),
            parameter.value_in(measurements),
        ) else {
            return None;
        };

        let key = AlertKey {
            node_id: row.node_id,
            parameter,
        };
        let evaluation = self.transition(key, !range.contains(value));

        trace!(
            "node {}: {parameter} {value} ({} to {}) -> {evaluation:?}",
            row.node_id, range.min, range.max
        );

        evaluation.notifies().then(|| AlertRequest::OutOfRange {
            node_id: row.node_id,
            parameter,
            value,
            expected: range,
            measurements: *measurements,
            timestamp: row.timestamp.clone(),
        })
    }

    fn check_liveness(
        &mut self,
        row: &ReadingRow,
        captured_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<AlertRequest> {
        let age = now - captured_at;
        let key = AlertKey {
            node_id: row.node_id,
            parameter: Parameter::Liveness,
        };
        let evaluation = self.transition(key, age > self.liveness_timeout());

        trace!(
            "node {}: last reading {}s ago -> {evaluation:?}",
            row.node_id,
            age.num_seconds()
        );

        evaluation.notifies().then(|| AlertRequest::Offline {
            node_id: row.node_id,
            last_seen: row.timestamp.clone(),
            timeout_minutes: self.liveness_timeout_minutes,
        })
    }

    fn transition(&mut self, key: AlertKey, violating: bool) -> AlertEvaluation {
        let evaluation = AlertEvaluation::evaluate(violating, self.is_active(&key));

        match evaluation {
            AlertEvaluation::Ok | AlertEvaluation::Exceeding => {}
            AlertEvaluation::StartsToExceed => {
                debug!("{key}: alert raised");
                self.active.insert(key, true);
            }
            AlertEvaluation::BackToOk => {
                debug!("{key}: back to normal");
                self.active.insert(key, false);
            }
        }

        evaluation
    }

    /// Status bar text
    ///
    /// ```text
    /// ALERTS:
    /// Node 1: pH, Turbidity out of range
    /// Node 2: No recent data (15.5+ min)
    /// ```
    pub fn status_summary(&self) -> String {
        let mut by_node: BTreeMap<NodeId, Vec<Parameter>> = BTreeMap::new();
        for key in self.active_alerts() {
            by_node.entry(key.node_id).or_default().push(key.parameter);
        }

        if by_node.is_empty() {
            return "Status: All readings normal".to_string();
        }

        let mut lines = vec!["ALERTS:".to_string()];
        for (node_id, parameters) in by_node {
            let offline = parameters.contains(&Parameter::Liveness);
            let out_of_range = parameters
                .iter()
                .filter(|parameter| **parameter != Parameter::Liveness)
                .map(|parameter| parameter.label())
                .collect::<Vec<_>>()
                .join(", ");
            let no_data = format!(
                "{} ({}+ min)",
                Parameter::Liveness.label(),
                self.liveness_timeout_minutes
            );

            let line = match (out_of_range.is_empty(), offline) {
                (false, true) => format!("Node {node_id}: {out_of_range} out of range; {no_data}"),
                (true, true) => format!("Node {node_id}: {no_data}"),
                _ => format!("Node {node_id}: {out_of_range} out of range"),
            };
            lines.push(line);
        }

        lines.join("\n")
    }
}
