//! Concurrency tests
//!
//! Two producers (the ingest actor and the simulator) append to the same
//! store at the same time. Every record must land exactly once and whole.

use std::sync::Arc;

use chrono::Utc;
use lwqms_gateway::{
    actors::{ingest::IngestHandle, simulator::SimulatorHandle},
    config::SimulatorConfig,
    storage::EventStore,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_producers_yield_exactly_n_rows() {
    const PACKETS: usize = 200;
    const SAMPLES: usize = 50;

    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(csv_store(&dir));

    let (tx, rx) = line_channel();
    let (_ingest, ingest_task) = IngestHandle::spawn(store.clone(), rx);

    let simulator = SimulatorHandle::spawn_with_rng(
        store.clone(),
        &SimulatorConfig {
            node_id: 2,
            interval_secs: 3600,
        },
        StdRng::seed_from_u64(42),
    );

    let producer = tokio::spawn(async move {
        for i in 0..PACKETS {
            let line = format!("LWQMS_PLD[1]: 0.{i:06} 20.000000 7.000000 END");
            tx.send(Ok(line)).await.unwrap();
        }
    });

    let sampler = tokio::spawn({
        let simulator = simulator.clone();
        async move {
            for _ in 0..SAMPLES {
                simulator.sample_now().await.unwrap();
            }
        }
    });

    producer.await.unwrap();
    sampler.await.unwrap();
    ingest_task.await.unwrap().unwrap();
    simulator.shutdown().await.unwrap();

    let rows = store.readings().await.unwrap();
    let node1 = rows.iter().filter(|row| row.node_id == 1).count();
    let node2 = rows.iter().filter(|row| row.node_id == 2).count();

    assert_eq!(node1, PACKETS);
    // the startup sample may or may not have been taken yet
    assert!(node2 == SAMPLES || node2 == SAMPLES + 1, "node 2 rows: {node2}");

    // every line on disk is a complete record
    let content = std::fs::read_to_string(dir.path().join("payloads.csv")).unwrap();
    let lines = content.lines().skip(1).collect::<Vec<_>>();
    assert_eq!(lines.len(), rows.len());
    assert!(lines.iter().all(|line| line.split(',').count() == 5));
    assert!(rows.iter().all(|row| row.measurements().is_ok() && row.captured_at().is_ok()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_direct_appends() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(csv_store(&dir));

    let tasks = (0..64)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .append_reading(&reading(i % 4, Utc::now(), 7.0))
                    .await
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let latest = store.latest_by_node(&[0, 1, 2, 3]).await.unwrap();
    assert!(latest.values().all(Option::is_some));
    assert_eq!(store.readings().await.unwrap().len(), 64);
}

#[tokio::test]
async fn test_concurrent_status_queries() {
    let store = Arc::new(lwqms_gateway::storage::MemoryStore::new());
    let alerts = spawn_alerts(store, Arc::new(RecordingNotifier::default()), vec![1]);

    let tasks = (0..10)
        .map(|_| {
            let alerts = alerts.clone();
            tokio::spawn(async move { alerts.status().await })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), "Status: All readings normal");
    }

    alerts.shutdown().await.unwrap();
}
