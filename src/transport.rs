//! Line sources
//!
//! The gateway's radio receiver shows up as a serial port that prints one
//! packet per line. Reading happens on a dedicated thread because the serial
//! API is blocking; lines are handed to the async side through a channel.

use std::fmt;
use std::io::{BufRead, BufReader, ErrorKind};
use std::thread;
use std::time::Duration;

use serialport::SerialPort;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use crate::config::SerialConfig;

/// Lines buffered between the reader thread and the ingest actor
const LINE_BUFFER: usize = 64;

#[derive(Debug)]
pub enum TransportError {
    /// The serial port could not be opened
    Open {
        port: String,
        source: serialport::Error,
    },

    /// Reading from the source failed
    Read(std::io::Error),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Open { port, source } => {
                write!(f, "failed to open serial port {}: {}", port, source)
            }
            TransportError::Read(err) => write!(f, "read error: {}", err),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Open { source, .. } => Some(source),
            TransportError::Read(err) => Some(err),
        }
    }
}

/// Open the receiver's serial port, 8N1 with a bounded read timeout.
pub fn open_serial(config: &SerialConfig) -> Result<Box<dyn SerialPort>, TransportError> {
    info!(
        "opening serial port {} at {} baud",
        config.port, config.baud_rate
    );

    serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(config.timeout_ms))
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .open()
        .map_err(|source| TransportError::Open {
            port: config.port.clone(),
            source,
        })
}

/// Read lines from `source` on a background thread.
///
/// Lines are decoded lossily and trimmed; empty lines are dropped. Read
/// timeouts are not errors. The channel closes at end of input, after the
/// first read error, or once the receiver is dropped.
pub fn spawn_line_reader<R>(source: R) -> mpsc::Receiver<Result<String, TransportError>>
where
    R: std::io::Read + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(LINE_BUFFER);

    let spawned = thread::Builder::new()
        .name("line-reader".to_string())
        .spawn(move || read_lines(BufReader::new(source), sender));

    if let Err(e) = spawned {
        // the sender was moved into the closure and dropped with it
        error!("failed to start line reader: {e}");
    }

    receiver
}

fn read_lines<R: BufRead>(mut reader: R, sender: mpsc::Sender<Result<String, TransportError>>) {
    // partial lines survive read timeouts
    let mut buf = Vec::new();

    loop {
        if sender.is_closed() {
            debug!("line receiver dropped, stopping reader");
            return;
        }

        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                if !buf.is_empty() && !forward(&sender, &buf) {
                    return;
                }
                debug!("end of input");
                return;
            }
            Ok(_) => {
                if !buf.ends_with(b"\n") {
                    // last line without terminator, EOF follows
                    continue;
                }
                if !forward(&sender, &buf) {
                    return;
                }
                buf.clear();
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                trace!("read timed out");
            }
            Err(e) => {
                let _ = sender.blocking_send(Err(TransportError::Read(e)));
                return;
            }
        }
    }
}

/// Returns `false` once the receiver is gone.
fn forward(sender: &mpsc::Sender<Result<String, TransportError>>, raw: &[u8]) -> bool {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();

    if line.is_empty() {
        return true;
    }

    trace!("received line: {line}");
    sender.blocking_send(Ok(line.to_string())).is_ok()
}
