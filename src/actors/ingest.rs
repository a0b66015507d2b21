//! IngestActor - Decodes received lines and appends them to the event store
//!
//! ## Message Flow
//!
//! ```text
//! line reader → decode → EventStore::append_*
//!     ↑
//!     └─── Commands (GetStats, Shutdown)
//! ```
//!
//! Undecodable lines are logged and dropped. A transport error ends the actor
//! and is returned from its task, the logger treats it as fatal.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::Event;
use crate::protocol::decode_line;
use crate::storage::EventStore;
use crate::transport::TransportError;

use super::messages::{IngestCommand, IngestStats};

pub type LineReceiver = mpsc::Receiver<Result<String, TransportError>>;

pub struct IngestActor {
    store: Arc<dyn EventStore>,

    /// Lines from the transport
    lines: LineReceiver,

    command_rx: mpsc::Receiver<IngestCommand>,

    stats: IngestStats,
}

impl IngestActor {
    pub fn new(
        store: Arc<dyn EventStore>,
        lines: LineReceiver,
        command_rx: mpsc::Receiver<IngestCommand>,
    ) -> Self {
        Self {
            store,
            lines,
            command_rx,
            stats: IngestStats::default(),
        }
    }

    /// Run until the line source ends, a transport error occurs or a
    /// Shutdown command is received.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Result<(), TransportError> {
        debug!("starting ingest actor");

        loop {
            tokio::select! {
                line = self.lines.recv() => {
                    match line {
                        Some(Ok(line)) => self.handle_line(&line).await,
                        Some(Err(e)) => {
                            error!("transport failed: {e}");
                            return Err(e);
                        }
                        None => {
                            info!("line source closed");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        IngestCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats);
                        }
                        IngestCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        info!("ingest actor stopped: {:?}", self.stats);
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) {
        self.stats.lines_received += 1;

        let event = match decode_line(line) {
            Ok(event) => event,
            Err(e) => {
                self.stats.decode_errors += 1;
                warn!("discarding line {line:?}: {e}");
                return;
            }
        };

        let result = match &event {
            Event::Reading(reading) => self.store.append_reading(reading).await,
            Event::Message(message) => self.store.append_message(message).await,
        };

        match (result, &event) {
            (Ok(()), Event::Reading(reading)) => {
                self.stats.readings_stored += 1;
                info!(
                    "node {}: turbidity {} NTU, temperature {} °C, pH {}",
                    reading.node_id, reading.turbidity_ntu, reading.temperature_c, reading.ph
                );
            }
            (Ok(()), Event::Message(message)) => {
                self.stats.messages_stored += 1;
                info!("node {}: {}", message.node_id, message.text);
            }
            (Err(e), _) => {
                self.stats.storage_errors += 1;
                error!("failed to store event from node {}: {e}", event.node_id());
            }
        }
    }
}

/// Handle for controlling the IngestActor
#[derive(Clone)]
pub struct IngestHandle {
    sender: mpsc::Sender<IngestCommand>,
}

impl IngestHandle {
    /// Spawn the actor; the join handle yields the transport error that ended
    /// it, if any.
    pub fn spawn(
        store: Arc<dyn EventStore>,
        lines: LineReceiver,
    ) -> (Self, JoinHandle<Result<(), TransportError>>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = IngestActor::new(store, lines, cmd_rx);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    pub async fn stats(&self) -> Result<IngestStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(IngestCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(IngestCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
