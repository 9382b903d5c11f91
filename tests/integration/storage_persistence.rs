//! Integration tests for SQLite record storage
//!
//! These tests verify that:
//! - Records survive closing and reopening the database
//! - Listings filter, sort and page inside SQL
//! - Deletes report how many rows went away
//! - The REST API behaves the same on top of SQLite

use std::sync::Arc;

use attestation_server::storage::{
    NewAlert, NewEvent, NewLog, RecordKind, RecordQuery, SortOrder, StorageBackend,
    StorageError, sqlite::SqliteBackend,
};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

use crate::helpers::*;

fn new_log(machine_id: &str, timestamp: i64, content: &str) -> NewLog {
    NewLog {
        machine_id: Some(machine_id.to_string()),
        content: Some(content.to_string()),
        kind: Some("AUTH".to_string()),
        timestamp: Some(timestamp),
        log_filepath: Some("/var/log/auth.log".to_string()),
    }
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("records.db");

    let (log_id, event_id) = {
        let storage = SqliteBackend::new(&db_path).await.unwrap();

        let log = storage.insert_log(new_log("m1", 100, "first")).await.unwrap();
        let event = storage
            .insert_event(NewEvent {
                machine_id: Some("m1".to_string()),
                kind: Some("AUTH".to_string()),
                timestamp: Some(100),
                data: Some(json!({"process": "sshd", "pid": 2211})),
                log_filepath: None,
            })
            .await
            .unwrap();

        storage.close().await.unwrap();
        (log.id, event.id)
    };

    let storage = SqliteBackend::new(&db_path).await.unwrap();

    let log = storage.find_log(log_id).await.unwrap().unwrap();
    assert_eq!(log.content.as_deref(), Some("first"));
    assert_eq!(log.kind.as_deref(), Some("AUTH"));

    let event = storage.find_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.data, Some(json!({"process": "sshd", "pid": 2211})));

    // ids keep counting after a reopen
    let next = storage.insert_log(new_log("m1", 101, "second")).await.unwrap();
    assert!(next.id > log_id);
}

#[tokio::test]
async fn test_listing_filters_in_sql() {
    let dir = tempdir().unwrap();
    let storage = SqliteBackend::new(dir.path().join("filters.db"))
        .await
        .unwrap();

    for (machine, ts) in [("m1", 10), ("m2", 20), ("m1", 30), ("m1", 40), ("m1", 50)] {
        storage
            .insert_log(new_log(machine, ts, &format!("{machine}@{ts}")))
            .await
            .unwrap();
    }

    let query = RecordQuery {
        machine_id: Some("m1".to_string()),
        min_timestamp: Some(20),
        max_timestamp: Some(50),
        ..Default::default()
    };
    let timestamps: Vec<_> = storage
        .find_logs(&query)
        .await
        .unwrap()
        .iter()
        .filter_map(|l| l.timestamp)
        .collect();
    assert_eq!(timestamps, vec![30, 40, 50]);

    let query = RecordQuery {
        sort_field: "content".to_string(),
        sort_order: SortOrder::Desc,
        page: 2,
        size: 2,
        ..Default::default()
    };
    let contents: Vec<_> = storage
        .find_logs(&query)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|l| l.content)
        .collect();
    assert_eq!(contents, vec!["m1@40", "m1@30"]);

    let query = RecordQuery {
        sort_field: "content; DROP TABLE logs".to_string(),
        ..Default::default()
    };
    assert_matches!(
        storage.find_logs(&query).await,
        Err(StorageError::InvalidQuery(_))
    );
}

#[tokio::test]
async fn test_alert_batch_and_delete() {
    let dir = tempdir().unwrap();
    let storage = SqliteBackend::new(dir.path().join("alerts.db"))
        .await
        .unwrap();

    let alerts = storage
        .insert_alerts(vec![
            NewAlert {
                machine_id: Some("m1".to_string()),
                subject: Some("disk".to_string()),
                reason: Some("95% full".to_string()),
                kind: Some("USAGE".to_string()),
                timestamp: Some(1),
            },
            NewAlert {
                machine_id: Some("m1".to_string()),
                subject: Some("login".to_string()),
                ..Default::default()
            },
        ])
        .await
        .unwrap();
    assert_eq!(alerts.len(), 2);

    let ids: Vec<i64> = alerts.iter().map(|a| a.id).collect();
    let deleted = storage
        .delete_by_ids(RecordKind::Alert, &[ids[0], 4242])
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(storage.delete_by_ids(RecordKind::Alert, &[]).await.unwrap(), 0);

    assert!(storage.find_alert(ids[0]).await.unwrap().is_none());
    assert!(storage.find_alert(ids[1]).await.unwrap().is_some());

    let health = storage.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.metadata["alerts"], "1");
}

#[tokio::test]
async fn test_api_on_sqlite() {
    let dir = tempdir().unwrap();
    let storage: Arc<dyn StorageBackend> =
        Arc::new(SqliteBackend::new(dir.path().join("api.db")).await.unwrap());
    let hub = spawn_test_hub_with(storage.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(hub.http("/api/log/add"))
        .json(&json!({"machine_id": "m1", "timestamp": 7, "content": "line"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let body: serde_json::Value = client
        .get(hub.http("/api/log/get?machine_id=m1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"][0]["content"], "line");

    let response = client
        .get(hub.http("/api/log/get?sort_field=nope"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let body: serde_json::Value = client
        .get(hub.http("/api/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["data"]["storage"]["metadata"]["backend"], "sqlite");
    assert_eq!(body["data"]["storage"]["metadata"]["logs"], "1");
}
