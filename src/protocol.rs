//! Wire protocol of the LoRa receiver
//!
//! The receiver forwards every packet it gets from a node as one text line on
//! its serial port. Two line shapes exist:
//!
//! ```text
//! LWQMS_PLD[<node>]: <turbidity> <temperature> <ph> END
//! LWQMS_MSG[<node>]: <free text> END
//! ```
//!
//! The payload fields arrive in the order turbidity, temperature, pH. The
//! decoder maps them onto the named fields of [`SensorReading`]; the storage
//! layer keeps the same column order as the wire.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::{Event, NodeId, NodeMessage, SensorReading};

pub const PAYLOAD_TAG: &str = "LWQMS_PLD";
pub const MESSAGE_TAG: &str = "LWQMS_MSG";
pub const END_MARKER: &str = "END";

/// Optional sign, digits with an optional decimal point, optional exponent.
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$").expect("valid number pattern")
});

/// Reasons a line is not recognized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Line does not start with a known tag
    UnknownTag,

    /// `[<digits>]` missing or malformed after the tag
    BadNodeIndex(String),

    /// `:` missing after the node index
    MissingColon,

    /// No standalone `END` token on the line
    MissingEnd,

    /// Payload did not contain exactly three fields before `END`
    FieldCount(usize),

    /// A payload field is not a number
    InvalidNumber(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnknownTag => write!(f, "unknown line tag"),
            DecodeError::BadNodeIndex(raw) => write!(f, "malformed node index: {raw:?}"),
            DecodeError::MissingColon => write!(f, "missing ':' after node index"),
            DecodeError::MissingEnd => write!(f, "missing {END_MARKER} marker"),
            DecodeError::FieldCount(count) => {
                write!(f, "expected 3 payload fields, found {count}")
            }
            DecodeError::InvalidNumber(raw) => write!(f, "invalid numeric field: {raw:?}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a line, stamping it with the current time.
pub fn decode_line(line: &str) -> Result<Event, DecodeError> {
    decode(line, Utc::now())
}

/// Decode a line, stamping it with `now`.
pub fn decode(line: &str, now: DateTime<Utc>) -> Result<Event, DecodeError> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PAYLOAD_TAG) {
        let (node_id, body) = split_header(rest)?;
        return decode_payload(node_id, body, now).map(Event::Reading);
    }

    if let Some(rest) = line.strip_prefix(MESSAGE_TAG) {
        let (node_id, body) = split_header(rest)?;
        let text = take_until_end(body)?.trim();
        return Ok(Event::Message(NodeMessage {
            timestamp: now,
            node_id,
            text: text.to_string(),
        }));
    }

    Err(DecodeError::UnknownTag)
}

/// Render an event in the form the receiver prints it.
pub fn encode(event: &Event) -> String {
    match event {
        Event::Reading(reading) => format!(
            "{PAYLOAD_TAG}[{}]: {:.6} {:.6} {:.6} {END_MARKER}",
            reading.node_id, reading.turbidity_ntu, reading.temperature_c, reading.ph
        ),
        Event::Message(message) => format!(
            "{MESSAGE_TAG}[{}]: {} {END_MARKER}",
            message.node_id, message.text
        ),
    }
}

/// Parse `[<digits>]:` and return the node id with the text after the colon.
fn split_header(rest: &str) -> Result<(NodeId, &str), DecodeError> {
    let inner = rest
        .strip_prefix('[')
        .ok_or_else(|| DecodeError::BadNodeIndex(rest.chars().take(8).collect()))?;
    let close = inner
        .find(']')
        .ok_or_else(|| DecodeError::BadNodeIndex(inner.chars().take(8).collect()))?;

    let digits = &inner[..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::BadNodeIndex(digits.to_string()));
    }
    let node_id = digits
        .parse::<NodeId>()
        .map_err(|_| DecodeError::BadNodeIndex(digits.to_string()))?;

    let body = inner[close + 1..]
        .strip_prefix(':')
        .ok_or(DecodeError::MissingColon)?;

    Ok((node_id, body))
}

/// Everything before the first standalone `END` token.
fn take_until_end(body: &str) -> Result<&str, DecodeError> {
    let mut search_from = 0;
    while let Some(offset) = body[search_from..].find(END_MARKER) {
        let start = search_from + offset;
        let end = start + END_MARKER.len();

        let starts_token = body[..start]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        let ends_token = body[end..].chars().next().is_none_or(char::is_whitespace);

        if starts_token && ends_token {
            return Ok(&body[..start]);
        }
        search_from = end;
    }

    Err(DecodeError::MissingEnd)
}

fn decode_payload(
    node_id: NodeId,
    body: &str,
    now: DateTime<Utc>,
) -> Result<SensorReading, DecodeError> {
    let fields = take_until_end(body)?;

    let tokens = fields.split_whitespace().collect::<Vec<_>>();
    let [turbidity, temperature, ph] = tokens.as_slice() else {
        return Err(DecodeError::FieldCount(tokens.len()));
    };

    Ok(SensorReading {
        timestamp: now,
        node_id,
        turbidity_ntu: parse_number(turbidity)?,
        temperature_c: parse_number(temperature)?,
        ph: parse_number(ph)?,
    })
}

fn parse_number(token: &str) -> Result<f64, DecodeError> {
    if !NUMBER.is_match(token) {
        return Err(DecodeError::InvalidNumber(token.to_string()));
    }
    token
        .parse::<f64>()
        .map_err(|_| DecodeError::InvalidNumber(token.to_string()))
}
