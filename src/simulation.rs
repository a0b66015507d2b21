//! Synthetic readings for nodes without a physical radio link
//!
//! Every parameter drifts by a bounded random walk around its baseline, so
//! consecutive samples look like a slowly changing water body instead of
//! noise.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::{NodeId, SensorReading};

/// Bounded random walk of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalk {
    pub baseline: f64,
    /// Maximum step, as a fraction of the baseline
    pub step_fraction: f64,
    pub hard_min: f64,
    pub hard_max: f64,
    current: f64,
}

impl RandomWalk {
    pub fn new(baseline: f64, step_fraction: f64, hard_min: f64, hard_max: f64) -> Self {
        Self {
            baseline,
            step_fraction,
            hard_min,
            hard_max,
            current: baseline,
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Lower and upper bound of the walk: the ±10% band around the baseline,
    /// narrowed to the hard limits.
    pub fn bounds(&self) -> (f64, f64) {
        let lower = self.hard_min.max(self.baseline * 0.9);
        let upper = self.hard_max.min(self.baseline * 1.1);
        (lower, upper)
    }

    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let max_step = (self.baseline * self.step_fraction).abs();
        let delta = rng.gen_range(-max_step..=max_step);
        let (lower, upper) = self.bounds();

        self.current = (self.current + delta).min(upper).max(lower);
        self.current
    }
}

/// A simulated node
#[derive(Debug, Clone)]
pub struct SyntheticNode {
    pub node_id: NodeId,
    pub ph: RandomWalk,
    pub temperature: RandomWalk,
    pub turbidity: RandomWalk,
}

impl SyntheticNode {
    /// Node with the baselines of the reference deployment
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ph: RandomWalk::new(7.83, 0.02, 6.5, 8.5),
            temperature: RandomWalk::new(22.75, 0.02, 0.0, 35.0),
            turbidity: RandomWalk::new(0.15, 0.05, 0.0, 1.0),
        }
    }

    /// Advance every walk one step and report it at wire precision.
    pub fn sample<R: Rng + ?Sized>(&mut self, rng: &mut R, now: DateTime<Utc>) -> SensorReading {
        SensorReading {
            timestamp: now,
            node_id: self.node_id,
            ph: round_to_wire(self.ph.step(rng)),
            temperature_c: round_to_wire(self.temperature.step(rng)),
            turbidity_ntu: round_to_wire(self.turbidity.step(rng)),
        }
    }
}

/// Nodes transmit six decimal places.
fn round_to_wire(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
