//! Event stores for readings and node messages
//!
//! This module provides a trait-based abstraction over the append-only logs
//! the gateway writes.
//!
//! ## Design
//!
//! - **Trait-based**: `EventStore` trait allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Append-only**: Records are never rewritten once committed
//!
//! ## Backends
//!
//! - **CSV** (default): Two flat files, readable by spreadsheets and the
//!   history view
//! - **SQLite** (feature `storage-sqlite`): Embedded database
//! - **In-Memory** (fallback): No persistence, for testing
//!
//! ## Usage
//!
//! ```no_run
//! use lwqms_gateway::storage::{CsvStore, EventStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = CsvStore::open("sensor_data.csv", "messages.csv")?;
//!     let latest = store.latest_by_node(&[1, 2]).await?;
//!     println!("{latest:?}");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod csv_log;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{EventStore, HealthStatus, LatestByNode};
pub use csv_log::CsvStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use schema::{MessageRow, ReadingRow};

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;

/// How a process uses the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The process appends (the logger)
    ReadWrite,
    /// The process only queries (hub, history view)
    ReadOnly,
}

/// Open the configured backend.
pub async fn open(config: &StorageConfig, access: Access) -> StorageResult<Arc<dyn EventStore>> {
    match config {
        StorageConfig::None => {
            info!("using in-memory event store, nothing will be persisted");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageConfig::Csv {
            readings_path,
            messages_path,
        } => match access {
            Access::ReadWrite => Ok(Arc::new(CsvStore::open(readings_path, messages_path)?)),
            Access::ReadOnly => Ok(Arc::new(CsvStore::open_read_only(readings_path, messages_path))),
        },
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => match access {
            Access::ReadWrite => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
            Access::ReadOnly => Ok(Arc::new(sqlite::SqliteStore::open_read_only(path).await?)),
        },
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::ConnectionFailed(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
