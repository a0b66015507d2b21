//! Safety envelopes for the three measured parameters
//!
//! Thresholds are global: every node is checked against the same ranges.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::storage::schema::Measurements;

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Ph,
    Temperature,
    Turbidity,
    /// The node stopped reporting
    Liveness,
}

impl Parameter {
    pub const MEASURED: [Parameter; 3] = [
        Parameter::Ph,
        Parameter::Temperature,
        Parameter::Turbidity,
    ];

    /// Label used in the status summary
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Ph => "pH",
            Parameter::Temperature => "Temperature",
            Parameter::Turbidity => "Turbidity",
            Parameter::Liveness => "No recent data",
        }
    }

    pub fn units(self) -> &'static str {
        match self {
            Parameter::Temperature => "°C",
            Parameter::Turbidity => "NTU",
            Parameter::Ph | Parameter::Liveness => "",
        }
    }

    /// The value of this parameter in `measurements`, `None` for liveness.
    pub fn value_in(self, measurements: &Measurements) -> Option<f64> {
        match self {
            Parameter::Ph => Some(measurements.ph),
            Parameter::Temperature => Some(measurements.temperature_c),
            Parameter::Turbidity => Some(measurements.turbidity_ntu),
            Parameter::Liveness => None,
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Parameter::Ph => "pH",
            Parameter::Temperature => "temperature",
            Parameter::Turbidity => "turbidity",
            Parameter::Liveness => "offline",
        };
        f.write_str(name)
    }
}

/// Inclusive range `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub ph: Range,
    pub temperature: Range,
    pub turbidity: Range,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ph: Range::new(6.5, 8.5),
            temperature: Range::new(0.0, 35.0),
            turbidity: Range::new(0.0, 1.0),
        }
    }
}

impl Thresholds {
    pub fn range(&self, parameter: Parameter) -> Option<Range> {
        match parameter {
            Parameter::Ph => Some(self.ph),
            Parameter::Temperature => Some(self.temperature),
            Parameter::Turbidity => Some(self.turbidity),
            Parameter::Liveness => None,
        }
    }

    /// Reject ranges that could never be satisfied or compared.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        for parameter in Parameter::MEASURED {
            let Some(range) = self.range(parameter) else {
                continue;
            };

            if !range.min.is_finite() || !range.max.is_finite() {
                return Err(ThresholdError::NotFinite(parameter));
            }

            if range.min > range.max {
                return Err(ThresholdError::Inverted {
                    parameter,
                    min: range.min,
                    max: range.max,
                });
            }
        }

        Ok(())
    }
}

/// Rejection reason of a threshold update
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdError {
    NotFinite(Parameter),
    Inverted { parameter: Parameter, min: f64, max: f64 },

    /// Liveness timeout is not a positive number of minutes
    LivenessTimeout(f64),
}

impl fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdError::NotFinite(parameter) => {
                write!(f, "{parameter} bounds must be finite numbers")
            }
            ThresholdError::Inverted {
                parameter,
                min,
                max,
            } => write!(
                f,
                "{parameter} minimum ({min}) is greater than its maximum ({max})"
            ),
            ThresholdError::LivenessTimeout(minutes) => write!(
                f,
                "liveness timeout must be a positive number of minutes, got {minutes}"
            ),
        }
    }
}

impl std::error::Error for ThresholdError {}
