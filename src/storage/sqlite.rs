//! SQLite event store
//!
//! Alternative to the CSV logs for gateways that prefer an embedded
//! database.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (the alert loop) do not block the writers
//! - **Synchronous FULL**: A committed append survives power loss
//! - **Migrations**: Schema versioning with sqlx
//!
//! Stored order is the autoincrement row id, so "latest" means highest id,
//! not newest timestamp.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::{EventStore, HealthStatus, LatestByNode, latest_in};
use super::error::{StorageError, StorageResult};
use super::schema::{MessageRow, ReadingRow, format_timestamp, format_value};
use crate::{NodeId, NodeMessage, SensorReading};

/// SQLite event store
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteStore {
    /// Open the database, creating it and running migrations if needed.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use lwqms_gateway::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./lwqms.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = Self::connect(options).await?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    /// Open an existing database without creating it or running migrations,
    /// for processes that only watch what the logger writes.
    #[instrument(skip_all)]
    pub async fn open_read_only(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("opening SQLite store read-only at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(false)
            .read_only(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        Ok(Self {
            pool: Self::connect(options).await?,
            db_path: db_path_str,
        })
    }

    async fn connect(options: SqliteConnectOptions) -> StorageResult<Pool<Sqlite>> {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))
    }

    fn reading_from_row(row: &SqliteRow) -> Option<ReadingRow> {
        let node_id = NodeId::try_from(row.get::<i64, _>("node_id")).ok()?;

        Some(ReadingRow {
            timestamp: row.get("timestamp"),
            node_id,
            turbidity: format_value(row.get("turbidity")),
            temperature: format_value(row.get("temperature")),
            ph: format_value(row.get("ph")),
        })
    }

    fn message_from_row(row: &SqliteRow) -> Option<MessageRow> {
        let node_id = NodeId::try_from(row.get::<i64, _>("node_id")).ok()?;

        Some(MessageRow {
            timestamp: row.get("timestamp"),
            node_id,
            message: row.get("message"),
        })
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    #[instrument(skip_all, fields(node_id = reading.node_id))]
    async fn append_reading(&self, reading: &SensorReading) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (timestamp, node_id, turbidity, temperature, ph)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(format_timestamp(&reading.timestamp))
        .bind(i64::from(reading.node_id))
        .bind(reading.turbidity_ntu)
        .bind(reading.temperature_c)
        .bind(reading.ph)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip_all, fields(node_id = message.node_id))]
    async fn append_message(&self, message: &NodeMessage) -> StorageResult<()> {
        sqlx::query("INSERT INTO messages (timestamp, node_id, message) VALUES (?, ?, ?)")
            .bind(format_timestamp(&message.timestamp))
            .bind(i64::from(message.node_id))
            .bind(&message.text)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn readings(&self) -> StorageResult<Vec<ReadingRow>> {
        let rows = sqlx::query(
            "SELECT timestamp, node_id, turbidity, temperature, ph FROM readings ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(Self::reading_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn history_for_node(&self, node_id: NodeId) -> StorageResult<Vec<ReadingRow>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, node_id, turbidity, temperature, ph
            FROM readings
            WHERE node_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(i64::from(node_id))
        .fetch_all(&self.pool)
        .await?;

        debug!("history query returned {} readings", rows.len());
        Ok(rows.iter().filter_map(Self::reading_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn latest_by_node(&self, nodes: &[NodeId]) -> StorageResult<LatestByNode> {
        let rows = sqlx::query(
            r#"
            SELECT r.timestamp, r.node_id, r.turbidity, r.temperature, r.ph
            FROM readings r
            JOIN (SELECT MAX(id) AS id FROM readings GROUP BY node_id) last ON r.id = last.id
            ORDER BY r.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(latest_in(
            rows.iter().filter_map(Self::reading_from_row),
            nodes,
        ))
    }

    async fn messages_for_node(&self, node_id: NodeId) -> StorageResult<Vec<MessageRow>> {
        let rows = sqlx::query(
            "SELECT timestamp, node_id, message FROM messages WHERE node_id = ? ORDER BY id ASC",
        )
        .bind(i64::from(node_id))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(Self::message_from_row).collect())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus {
                healthy: true,
                message: "SQLite backend operational".to_string(),
                metadata: HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("db_path".to_string(), self.db_path.clone()),
                ]),
            }),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}
