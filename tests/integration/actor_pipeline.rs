//! End-to-end tests: lines in, rows on disk, alerts out

use std::sync::Arc;

use chrono::{Duration, Local, Utc};
use lwqms_gateway::{
    actors::{ingest::IngestHandle, messages::CycleOutcome},
    monitors::{AlertKey, Parameter},
    storage::{CsvStore, EventStore},
};
use pretty_assertions::assert_eq;

use crate::helpers::*;

async fn send_lines(lines: &[&str], store: Arc<dyn EventStore>) {
    let (tx, rx) = line_channel();
    let (_ingest, task) = IngestHandle::spawn(store, rx);

    for line in lines {
        tx.send(Ok(line.to_string())).await.unwrap();
    }
    drop(tx);

    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reference_packet_is_stored_in_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(csv_store(&dir));

    send_lines(&["LWQMS_PLD[1]: 0.000450 23.000000 7.000000 END"], store.clone()).await;

    let content = std::fs::read_to_string(dir.path().join("payloads.csv")).unwrap();
    let lines = content.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "Time,Sensor Node ID,Turbidity (NTU),Temperature (C),pH");
    assert!(lines[1].ends_with(",1,0.00045,23.0,7.0"), "{}", lines[1]);

    let notifier = Arc::new(RecordingNotifier::default());
    let alerts = spawn_alerts(store, notifier.clone(), vec![1]);

    assert_eq!(
        alerts.evaluate_now().await.unwrap(),
        CycleOutcome::Evaluated { raised: 0, delivered: 0 }
    );
    assert!(notifier.subjects().is_empty());
    assert_eq!(alerts.status().await.unwrap(), "Status: All readings normal");

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_excursion_raises_once_and_clears_silently() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn EventStore> = Arc::new(csv_store(&dir));
    let notifier = Arc::new(RecordingNotifier::default());
    let alerts = spawn_alerts(store.clone(), notifier.clone(), vec![1, 2]);

    send_lines(&["LWQMS_PLD[1]: 0.2 21.0 9.100000 END"], store.clone()).await;
    alerts.evaluate_now().await.unwrap();

    send_lines(&["LWQMS_PLD[1]: 0.2 21.0 9.300000 END"], store.clone()).await;
    alerts.evaluate_now().await.unwrap();

    assert_eq!(
        alerts.active_alerts().await.unwrap(),
        vec![AlertKey { node_id: 1, parameter: Parameter::Ph }]
    );
    assert_eq!(
        alerts.status().await.unwrap(),
        "ALERTS:\nNode 1: pH out of range"
    );

    send_lines(&["LWQMS_PLD[1]: 0.2 21.0 7.2 END"], store.clone()).await;
    alerts.evaluate_now().await.unwrap();

    assert_eq!(notifier.subjects(), vec!["LWQMS ALERT: pH out of range at Node 1"]);
    assert!(notifier.bodies()[0].contains("pH: 9.1\n"));
    assert!(notifier.bodies()[0].ends_with("Expected pH range: 6.5 to 8.5"));
    assert!(alerts.active_alerts().await.unwrap().is_empty());

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_node_is_reported_offline() {
    let dir = tempfile::tempdir().unwrap();
    let last_seen = (Local::now() - Duration::minutes(20)).naive_local();
    std::fs::write(
        dir.path().join("payloads.csv"),
        format!(
            "Time,Sensor Node ID,Turbidity (NTU),Temperature (C),pH\n{},2,0.150000,22.750000,7.830000\n",
            last_seen.format("%Y-%m-%dT%H:%M:%S%.6f")
        ),
    )
    .unwrap();

    let store: Arc<dyn EventStore> = Arc::new(csv_store(&dir));
    let notifier = Arc::new(RecordingNotifier::default());
    let alerts = spawn_alerts(store.clone(), notifier.clone(), vec![1, 2]);

    alerts.evaluate_now().await.unwrap();

    assert_eq!(notifier.subjects(), vec!["LWQMS ALERT: Node 2 Offline"]);
    assert!(
        notifier.bodies()[0].starts_with("Node 2 has not sent data for over 15.5 minutes.")
    );

    // a fresh reading brings the node back without another notification
    store.append_reading(&reading(2, Utc::now(), 7.8)).await.unwrap();
    alerts.evaluate_now().await.unwrap();

    assert_eq!(notifier.subjects().len(), 1);
    assert_eq!(alerts.status().await.unwrap(), "Status: All readings normal");

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_messages_and_history_views() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(csv_store(&dir));

    send_lines(
        &[
            "LWQMS_MSG[1]: Transmitter Ready END",
            "LWQMS_PLD[1]: 0.1 20.0 7.0 END",
            "LWQMS_PLD[3]: 0.1 20.0 7.1 END",
            "LWQMS_PLD[1]: 0.1 20.0 7.2 END",
            "not a packet",
        ],
        store.clone(),
    )
    .await;

    let reader = CsvStore::open_read_only(dir.path().join("payloads.csv"), dir.path().join("messages.csv"));

    let history = reader.history_for_node(1).await.unwrap();
    assert_eq!(
        history.iter().map(|row| row.ph.as_str()).collect::<Vec<_>>(),
        vec!["7.0", "7.2"]
    );

    let messages = reader.messages_for_node(1).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "Transmitter Ready");
}
