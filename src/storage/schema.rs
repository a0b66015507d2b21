//! Row definitions of the persisted logs
//!
//! ## Column contract
//!
//! Readings are stored as
//!
//! ```text
//! Time, Sensor Node ID, Turbidity (NTU), Temperature (C), pH
//! ```
//!
//! which is the wire order of the payload fields, not the field order of
//! [`SensorReading`]. Consumers read the columns positionally, so this order
//! must never change.
//!
//! Messages are stored as `Time, Sensor Node ID, Message`.
//!
//! Values are kept as text in [`ReadingRow`]. A row written by an older
//! logger (or damaged by a crash) may hold a value that does not parse, and the
//! alert engine has to be able to skip just the affected check.

use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{NodeId, NodeMessage, SensorReading};

pub const READING_HEADER: [&str; 5] = [
    "Time",
    "Sensor Node ID",
    "Turbidity (NTU)",
    "Temperature (C)",
    "pH",
];

pub const MESSAGE_HEADER: [&str; 3] = ["Time", "Sensor Node ID", "Message"];

/// A field of a stored row could not be interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// Timestamp is not ISO-8601
    Timestamp(String),

    /// A measurement is not a floating point number
    Measurement { column: &'static str, raw: String },
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::Timestamp(raw) => write!(f, "unparsable timestamp: {raw:?}"),
            ValueError::Measurement { column, raw } => {
                write!(f, "unparsable {column} value: {raw:?}")
            }
        }
    }
}

impl std::error::Error for ValueError {}

/// The three measurements of a row, by name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurements {
    pub ph: f64,
    pub temperature_c: f64,
    pub turbidity_ntu: f64,
}

/// One stored reading, as read back from a log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRow {
    pub timestamp: String,
    pub node_id: NodeId,
    pub turbidity: String,
    pub temperature: String,
    pub ph: String,
}

impl ReadingRow {
    pub fn from_reading(reading: &SensorReading) -> Self {
        Self {
            timestamp: format_timestamp(&reading.timestamp),
            node_id: reading.node_id,
            turbidity: format_value(reading.turbidity_ntu),
            temperature: format_value(reading.temperature_c),
            ph: format_value(reading.ph),
        }
    }

    /// Build a row from positional columns, `None` if the row is too short
    /// or the node id is not a number.
    pub fn from_columns<'a>(mut columns: impl Iterator<Item = &'a str>) -> Option<Self> {
        let timestamp = columns.next()?;
        let node_id = columns.next()?.trim().parse().ok()?;
        let turbidity = columns.next()?;
        let temperature = columns.next()?;
        let ph = columns.next()?;

        Some(Self {
            timestamp: timestamp.to_string(),
            node_id,
            turbidity: turbidity.to_string(),
            temperature: temperature.to_string(),
            ph: ph.to_string(),
        })
    }

    /// Columns in storage order.
    pub fn to_columns(&self) -> [String; 5] {
        [
            self.timestamp.clone(),
            self.node_id.to_string(),
            self.turbidity.clone(),
            self.temperature.clone(),
            self.ph.clone(),
        ]
    }

    pub fn captured_at(&self) -> Result<DateTime<Utc>, ValueError> {
        parse_timestamp(&self.timestamp)
    }

    pub fn measurements(&self) -> Result<Measurements, ValueError> {
        Ok(Measurements {
            ph: parse_value("pH", &self.ph)?,
            temperature_c: parse_value("temperature", &self.temperature)?,
            turbidity_ntu: parse_value("turbidity", &self.turbidity)?,
        })
    }
}

/// One stored node message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub timestamp: String,
    pub node_id: NodeId,
    pub message: String,
}

impl MessageRow {
    pub fn from_message(message: &NodeMessage) -> Self {
        Self {
            timestamp: format_timestamp(&message.timestamp),
            node_id: message.node_id,
            message: message.text.clone(),
        }
    }

    pub fn from_columns<'a>(mut columns: impl Iterator<Item = &'a str>) -> Option<Self> {
        let timestamp = columns.next()?;
        let node_id = columns.next()?.trim().parse().ok()?;
        let message = columns.next()?;

        Some(Self {
            timestamp: timestamp.to_string(),
            node_id,
            message: message.to_string(),
        })
    }

    pub fn to_columns(&self) -> [String; 3] {
        [
            self.timestamp.clone(),
            self.node_id.to_string(),
            self.message.clone(),
        ]
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Parse a stored timestamp.
///
/// RFC 3339 is what this crate writes. Naive ISO-8601 timestamps (no offset)
/// are taken as local time, which is how the first gateway scripts wrote
/// them.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ValueError> {
    let trimmed = raw.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| ValueError::Timestamp(raw.to_string()))
}

pub(crate) fn format_value(value: f64) -> String {
    // `{:?}` keeps a decimal point on whole numbers ("23.0")
    format!("{value:?}")
}

fn parse_value(column: &'static str, raw: &str) -> Result<f64, ValueError> {
    raw.trim().parse().map_err(|_| ValueError::Measurement {
        column,
        raw: raw.to_string(),
    })
}
