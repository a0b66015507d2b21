//! SimulatorActor - Stores synthetic readings for a node without a radio
//!
//! The first sample is taken right at startup, then one per interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SimulatorConfig;
use crate::simulation::SyntheticNode;
use crate::storage::{EventStore, StorageResult};
use crate::{NodeId, SensorReading};

use super::messages::SimulatorCommand;

pub struct SimulatorActor {
    store: Arc<dyn EventStore>,
    node: SyntheticNode,
    rng: StdRng,
    interval_duration: Duration,
    command_rx: mpsc::Receiver<SimulatorCommand>,
}

impl SimulatorActor {
    pub fn new(
        store: Arc<dyn EventStore>,
        node: SyntheticNode,
        rng: StdRng,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<SimulatorCommand>,
    ) -> Self {
        Self {
            store,
            node,
            rng,
            interval_duration,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(node_id = self.node.node_id))]
    pub async fn run(mut self) {
        debug!("starting simulator actor");

        // the first tick completes immediately
        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sample().await {
                        error!("failed to store simulated reading: {e}");
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SimulatorCommand::SampleNow { respond_to } => {
                            let _ = respond_to.send(self.sample().await);
                        }
                        SimulatorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("simulator actor stopped");
    }

    async fn sample(&mut self) -> StorageResult<SensorReading> {
        let reading = self.node.sample(&mut self.rng, Utc::now());
        self.store.append_reading(&reading).await?;

        info!(
            "simulated node {}: turbidity {:.6} NTU, temperature {:.6} °C, pH {:.6}",
            reading.node_id, reading.turbidity_ntu, reading.temperature_c, reading.ph
        );
        Ok(reading)
    }
}

/// Handle for controlling a SimulatorActor
#[derive(Clone)]
pub struct SimulatorHandle {
    sender: mpsc::Sender<SimulatorCommand>,
    pub node_id: NodeId,
}

impl SimulatorHandle {
    /// Spawn a simulator seeded from the OS random source
    pub fn spawn(store: Arc<dyn EventStore>, config: &SimulatorConfig) -> Self {
        Self::spawn_with_rng(store, config, StdRng::from_entropy())
    }

    pub fn spawn_with_rng(store: Arc<dyn EventStore>, config: &SimulatorConfig, rng: StdRng) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SimulatorActor::new(
            store,
            SyntheticNode::new(config.node_id),
            rng,
            Duration::from_secs(config.interval_secs),
            cmd_rx,
        );

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            node_id: config.node_id,
        }
    }

    pub async fn sample_now(&self) -> Result<SensorReading> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SimulatorCommand::SampleNow { respond_to: tx })
            .await
            .context("failed to send SampleNow command")?;

        Ok(rx.await.context("failed to receive response")??)
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SimulatorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
