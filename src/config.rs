use std::path::PathBuf;

use serde::Deserialize;
use tracing::trace;

use crate::NodeId;
use crate::monitors::{DEFAULT_LIVENESS_TIMEOUT_MINUTES, Thresholds};

/// Event store configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// Two CSV files (default)
    Csv {
        #[serde(default = "default_readings_path")]
        readings_path: PathBuf,

        #[serde(default = "default_messages_path")]
        messages_path: PathBuf,
    },

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Csv {
            readings_path: default_readings_path(),
            messages_path: default_messages_path(),
        }
    }
}

fn default_readings_path() -> PathBuf {
    PathBuf::from("payloads.csv")
}

fn default_messages_path() -> PathBuf {
    PathBuf::from("messages.csv")
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./lwqms.db")
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 115_200,
            timeout_ms: 1_000,
        }
    }
}

/// Synthetic node without a physical radio link
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub node_id: NodeId,
    pub interval_secs: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            node_id: 2,
            interval_secs: 15 * 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifierConfig {
    Email(EmailConfig),
    Webhook(Webhook),
    /// Only log notifications
    #[default]
    Log,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender: String,
    pub recipient: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub storage: StorageConfig,
    pub thresholds: Thresholds,
    pub liveness_timeout_minutes: f64,
    /// Seconds between two alert evaluations
    pub poll_interval_secs: u64,
    /// Nodes the alert loop watches
    pub nodes: Vec<NodeId>,
    /// `null` disables the simulator
    pub simulator: Option<SimulatorConfig>,
    pub notifier: NotifierConfig,
    pub notify_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            storage: StorageConfig::default(),
            thresholds: Thresholds::default(),
            liveness_timeout_minutes: DEFAULT_LIVENESS_TIMEOUT_MINUTES,
            poll_interval_secs: 5,
            nodes: vec![1, 2],
            simulator: Some(SimulatorConfig::default()),
            notifier: NotifierConfig::default(),
            notify_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Check values serde cannot check.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.thresholds.validate()?;

        if !(self.liveness_timeout_minutes.is_finite() && self.liveness_timeout_minutes > 0.0) {
            anyhow::bail!("liveness_timeout_minutes must be a positive number");
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than zero");
        }
        if self.notify_timeout_secs == 0 {
            anyhow::bail!("notify_timeout_secs must be greater than zero");
        }
        if self.simulator.as_ref().is_some_and(|sim| sim.interval_secs == 0) {
            anyhow::bail!("simulator interval_secs must be greater than zero");
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content)
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
