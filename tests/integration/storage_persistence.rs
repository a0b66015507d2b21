//! Event stores keep their data across restarts

use chrono::{Duration, TimeZone, Utc};
use lwqms_gateway::{
    NodeMessage,
    config::StorageConfig,
    storage::{self, Access, EventStore},
};

use crate::helpers::*;

fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
}

async fn fill(store: &dyn EventStore) {
    for minute in 0..3 {
        store
            .append_reading(&reading(1, start() + Duration::minutes(minute), 7.0 + minute as f64 / 10.0))
            .await
            .unwrap();
    }
    store
        .append_reading(&reading(2, start(), 8.0))
        .await
        .unwrap();
    store
        .append_message(&NodeMessage {
            timestamp: start(),
            node_id: 1,
            text: "Transmitter Ready".to_string(),
        })
        .await
        .unwrap();
}

async fn check(store: &dyn EventStore) {
    let latest = store.latest_by_node(&[1, 2, 3]).await.unwrap();
    assert_eq!(latest[&1].as_ref().unwrap().ph, "7.2");
    assert_eq!(latest[&2].as_ref().unwrap().ph, "8.0");
    assert!(latest[&3].is_none());

    assert_eq!(store.history_for_node(1).await.unwrap().len(), 3);
    assert_eq!(store.messages_for_node(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_csv_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::Csv {
        readings_path: dir.path().join("payloads.csv"),
        messages_path: dir.path().join("messages.csv"),
    };

    {
        let store = storage::open(&config, Access::ReadWrite).await.unwrap();
        fill(store.as_ref()).await;
        store.close().await.unwrap();
    }

    let store = storage::open(&config, Access::ReadOnly).await.unwrap();
    check(store.as_ref()).await;
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig::Sqlite {
        path: dir.path().join("events.db"),
    };

    {
        let store = storage::open(&config, Access::ReadWrite).await.unwrap();
        fill(store.as_ref()).await;
        store.close().await.unwrap();
    }

    let store = storage::open(&config, Access::ReadOnly).await.unwrap();
    check(store.as_ref()).await;
}

#[tokio::test]
async fn test_memory_store_starts_empty() {
    let store = storage::open(&StorageConfig::None, Access::ReadWrite)
        .await
        .unwrap();

    let latest = store.latest_by_node(&[1]).await.unwrap();
    assert!(latest[&1].is_none());
}
