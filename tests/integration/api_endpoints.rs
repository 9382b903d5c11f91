//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - Record endpoints store, list, filter and delete logs, events and alerts
//! - Error responses carry the `{status, message}` envelope and the right code
//! - Relay inspection endpoints reflect live sessions

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use crate::helpers::*;

async fn post(url: String, body: Value) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.json().await.unwrap())
}

async fn get(url: String) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.json().await.unwrap())
}

async fn delete(url: String, body: Value) -> (StatusCode, Value) {
    let response = reqwest::Client::new()
        .delete(url)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_root_reports_running() {
    let hub = spawn_test_hub().await;

    let (status, body) = get(hub.http("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "Hurrah! API is running."}));
}

#[tokio::test]
async fn test_health_endpoint() {
    let hub = spawn_test_hub().await;
    let _reporter = connect_reporter(&hub, "m1").await;

    let (status, body) = get(hub.http("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["relay"]["sessions"], 1);
    assert_eq!(body["data"]["storage"]["healthy"], true);
    assert_eq!(body["data"]["storage"]["metadata"]["backend"], "memory");
}

#[tokio::test]
async fn test_log_lifecycle() {
    let hub = spawn_test_hub().await;

    let (status, body) = post(
        hub.http("/api/log/add"),
        json!({
            "machine_id": "m1",
            "content": "Mar  4 09:15:02 web-1 sshd[2211]: Accepted publickey",
            "type": "AUTH",
            "timestamp": 100,
            "log_filepath": "/var/log/auth.log"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Log saved successfully!");
    let id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["type"], "AUTH");

    let (status, body) = get(hub.http(&format!("/api/log/get?id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Log fetched successfully!");
    assert_eq!(body["data"]["machine_id"], "m1");

    let (status, body) = delete(hub.http("/api/log/remove"), json!([id, 999])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logs removed successfully!");
    assert_eq!(body["data"], json!({"requested": 2, "deleted": 1}));

    let (status, body) = get(hub.http(&format!("/api/log/get?id={id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"status": "error", "message": "No log found!"}));
}

#[tokio::test]
async fn test_log_listing_filters_and_pages() {
    let hub = spawn_test_hub().await;

    for (machine, timestamp) in [("m1", 30), ("m2", 20), ("m1", 10), ("m1", 40)] {
        let (status, _) = post(
            hub.http("/api/log/add"),
            json!({"machine_id": machine, "timestamp": timestamp, "type": "AUTH"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = get(hub.http("/api/log/get")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logs fetched successfully!");
    let timestamps: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|log| log["timestamp"].as_i64().unwrap())
        .collect();
    assert_eq!(timestamps, vec![10, 20, 30, 40]);

    let (_, body) = get(hub.http(
        "/api/log/get?machine_id=m1&min_timestamp=20&sort_order=desc&page=1&size=1",
    ))
    .await;
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["timestamp"], 40);

    let (_, body) = get(hub.http(
        "/api/log/get?machine_id=m1&min_timestamp=20&sort_order=desc&page=2&size=1",
    ))
    .await;
    assert_eq!(body["data"][0]["timestamp"], 30);

    // empty values fall back to the defaults
    let (status, body) = get(hub.http("/api/log/get?id=&machine_id=&size=")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_invalid_listing_parameters() {
    let hub = spawn_test_hub().await;

    let (status, body) = get(hub.http("/api/log/get?sort_field=password")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, _) = get(hub.http("/api/event/get?sort_order=sideways")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(hub.http("/api/alert/get?min_timestamp=yesterday")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_rejects_empty_body() {
    let hub = spawn_test_hub().await;

    for body in [json!(null), json!(""), json!([])] {
        let (status, response) = post(hub.http("/api/log/add"), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response,
            json!({"status": "error", "message": "Didn't receive any data."})
        );
    }

    let response = reqwest::Client::new()
        .post(hub.http("/api/event/add"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_event_accepts_props_alias() {
    let hub = spawn_test_hub().await;

    let (status, body) = post(
        hub.http("/api/event/add"),
        json!({
            "machine_id": "m1",
            "type": "AUTH",
            "timestamp": 5,
            "props": {"process": "sshd", "pid": 2211}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Event saved successfully!");
    assert_eq!(body["data"]["data"], json!({"process": "sshd", "pid": 2211}));

    let (_, body) = get(hub.http("/api/event/get?machine_id=m1")).await;
    assert_eq!(body["message"], "Events fetched successfully!");
    assert_eq!(body["data"][0]["data"]["process"], "sshd");
}

#[tokio::test]
async fn test_alerts_require_array() {
    let hub = spawn_test_hub().await;

    let (status, body) = post(
        hub.http("/api/alert/add"),
        json!({"machine_id": "m1", "subject": "disk"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Expected data to be an 'Array', got something else."
    );

    let (status, body) = post(
        hub.http("/api/alert/add"),
        json!([
            {"machine_id": "m1", "subject": "disk", "reason": "95% full", "type": "USAGE", "timestamp": 1},
            {"machine_id": "m1", "subject": "login", "reason": "root login", "type": "AUTH", "timestamp": 2}
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Alerts saved successfully!");
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (_, body) = get(hub.http("/api/alert/get?sort_field=subject&sort_order=desc")).await;
    assert_eq!(body["data"][0]["subject"], "login");
    assert_eq!(body["data"][1]["subject"], "disk");
}

#[tokio::test]
async fn test_remove_requires_id_array() {
    let hub = spawn_test_hub().await;

    let (status, body) = delete(hub.http("/api/event/remove"), json!({"id": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Expected data to be an 'Array', got something else."
    );

    let (status, _) = delete(hub.http("/api/event/remove"), json!(["one"])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // ids may arrive as strings
    let (_, body) = post(hub.http("/api/event/add"), json!({"machine_id": "m1"})).await;
    let id = body["data"]["id"].as_i64().unwrap();
    let (status, body) = delete(hub.http("/api/event/remove"), json!([id.to_string()])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], 1);
}

#[tokio::test]
async fn test_relay_session_endpoints() {
    let hub = spawn_test_hub().await;
    let mut viewer = connect_viewer(&hub, None).await;
    let mut reporter = connect_reporter(&hub, "m1").await;

    for offset in [-2, -1] {
        send_sample(
            &mut reporter,
            "m1",
            BASE_TIME + offset,
            "USAGE",
            json!({"cpu": {"usage": 10 + offset}}),
        )
        .await;
        next_json(&mut viewer).await;
    }

    let (status, body) = get(hub.http("/api/relay/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["machine_id"], "m1");
    assert_eq!(sessions[0]["status"], "attached");
    assert_eq!(sessions[0]["samples"], 2);

    let (status, body) = get(hub.http("/api/relay/sessions/m1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["machine_id"], "m1");
    assert_eq!(body["data"]["logs"].as_object().unwrap().len(), 2);

    let (status, body) = get(hub.http("/api/relay/sessions/m1/series?path=cpu.usage")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!([[BASE_TIME - 2, 8], [BASE_TIME - 1, 9]])
    );

    let (status, _) = get(hub.http("/api/relay/sessions/m1/series")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(hub.http("/api/relay/sessions/m1/series?path=cpu.missing")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = get(hub.http("/api/relay/sessions/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
}
