//! Failure handling: broken transport, failing notifiers, unreadable rows

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use lwqms_gateway::{
    actors::{alert::AlertHandle, ingest::IngestHandle, messages::CycleOutcome},
    alerts::AlertManager,
    monitors::AlertEngine,
    notifier::WebhookNotifier,
    storage::{EventStore, MemoryStore},
    transport::{TransportError, spawn_line_reader},
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_transport_error_is_fatal_after_stored_lines() {
    let store = Arc::new(MemoryStore::new());
    let (tx, rx) = line_channel();
    let (_ingest, task) = IngestHandle::spawn(store.clone(), rx);

    tx.send(Ok("LWQMS_PLD[1]: 0.1 20.0 7.0 END".to_string()))
        .await
        .unwrap();
    tx.send(Err(TransportError::Read(std::io::Error::other("device unplugged"))))
        .await
        .unwrap();

    assert_matches!(task.await.unwrap(), Err(TransportError::Read(_)));
    assert_eq!(store.readings().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_replayed_capture_is_ingested() {
    let capture = "\
        LWQMS_MSG[1]: Transmitter Ready END\n\
        LWQMS_PLD[1]: 0.000450 23.000000 7.000000 END\n\
        LWQMS_PLD[1]: 0.000450 23.000000 END\n\
        \n\
        LWQMS_PLD[2]: 0.150000 22.750000 7.830000 END trailing noise\n";

    let store = Arc::new(MemoryStore::new());
    let (ingest, task) = IngestHandle::spawn(store.clone(), spawn_line_reader(capture.as_bytes()));
    task.await.unwrap().unwrap();

    assert!(ingest.stats().await.is_err(), "actor should have stopped at end of input");
    assert_eq!(store.readings().await.unwrap().len(), 2);
    assert_eq!(store.messages_for_node(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_delivery_keeps_alert_active() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    store.append_reading(&reading(1, Utc::now(), 4.0)).await.unwrap();

    let alerts = AlertHandle::spawn(
        AlertEngine::default(),
        store,
        AlertManager::new(
            Arc::new(WebhookNotifier::new(server.uri())),
            Duration::from_secs(5),
        ),
        vec![1],
        Duration::from_secs(3600),
    );

    assert_eq!(
        alerts.evaluate_now().await.unwrap(),
        CycleOutcome::Evaluated { raised: 1, delivered: 0 }
    );
    // not retried on the next cycle
    assert_eq!(
        alerts.evaluate_now().await.unwrap(),
        CycleOutcome::Evaluated { raised: 0, delivered: 0 }
    );
    assert_eq!(alerts.active_alerts().await.unwrap().len(), 1);

    alerts.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unparsable_row_only_skips_range_checks() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("payloads.csv"),
        "Time,Sensor Node ID,Turbidity (NTU),Temperature (C),pH\n\
         2020-01-01T00:00:00,1,0.1,warm,99.0\n\
         short,row\n",
    )
    .unwrap();

    let store = Arc::new(csv_store(&dir));
    let notifier = Arc::new(RecordingNotifier::default());
    let alerts = spawn_alerts(store, notifier.clone(), vec![1]);

    alerts.evaluate_now().await.unwrap();

    // pH 99 is ignored because the temperature column is broken, the node
    // is still old enough to be offline
    assert_eq!(notifier.subjects(), vec!["LWQMS ALERT: Node 1 Offline"]);

    alerts.shutdown().await.unwrap();
}
