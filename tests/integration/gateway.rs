//! WebSocket gateway tests over real sockets

use std::time::Duration;

use attestation_server::relay::SessionStatus;
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

use crate::helpers::*;

#[tokio::test]
async fn test_viewer_receives_window_in_chronological_order() {
    let hub = spawn_test_hub().await;
    let mut viewer = connect_viewer(&hub, None).await;
    let mut reporter = connect_reporter(&hub, "m1").await;

    // 9 and 10 sort the wrong way round as strings
    for offset in [-10, -9, 0] {
        send_sample(
            &mut reporter,
            "m1",
            BASE_TIME + offset,
            "USAGE",
            json!({"cpu": {"usage": offset}}),
        )
        .await;
    }

    let mut last = String::new();
    for _ in 0..3 {
        last = next_text(&mut viewer).await;
    }

    let frame: serde_json::Value = serde_json::from_str(&last).unwrap();
    assert_eq!(frame["event"], "receive_logs");
    assert_eq!(frame["data"]["machine_id"], "m1");

    let logs = frame["data"]["logs"].as_object().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(
        logs[&(BASE_TIME - 9).to_string()],
        json!({"type": "USAGE", "data": {"cpu": {"usage": -9}}})
    );

    let positions: Vec<usize> = [-10, -9, 0]
        .iter()
        .map(|offset| last.find(&format!("\"{}\"", BASE_TIME + offset)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
}

#[tokio::test]
async fn test_filtered_viewer_only_sees_its_machine() {
    let hub = spawn_test_hub().await;
    let mut filtered = connect_viewer(&hub, Some("b")).await;
    let mut everything = connect_viewer(&hub, None).await;
    let mut a = connect_reporter(&hub, "a").await;
    let mut b = connect_reporter(&hub, "b").await;

    send_sample(&mut a, "a", BASE_TIME, "USAGE", json!({"n": 1})).await;
    assert_eq!(next_json(&mut everything).await["data"]["machine_id"], "a");

    send_sample(&mut b, "b", BASE_TIME, "USAGE", json!({"n": 2})).await;
    assert_eq!(next_json(&mut everything).await["data"]["machine_id"], "b");

    let frame = next_json(&mut filtered).await;
    assert_eq!(frame["data"]["machine_id"], "b");
    assert_silent(&mut filtered, 200).await;
}

#[tokio::test]
async fn test_sample_uses_handshake_id_when_missing() {
    let hub = spawn_test_hub().await;
    let mut viewer = connect_viewer(&hub, None).await;
    let mut reporter = connect_reporter(&hub, "m1").await;

    let frame = json!({
        "event": "collect_log",
        "data": {"timestamp": BASE_TIME, "type": "USAGE", "data": {"cpu": 1}}
    });
    reporter
        .send(Message::Text(frame.to_string()))
        .await
        .unwrap();

    assert_eq!(next_json(&mut viewer).await["data"]["machine_id"], "m1");
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let hub = spawn_test_hub().await;
    let mut viewer = connect_viewer(&hub, None).await;
    let mut reporter = connect_reporter(&hub, "m1").await;

    reporter
        .send(Message::Text("definitely not json".to_string()))
        .await
        .unwrap();
    reporter
        .send(Message::Text(
            json!({"event": "collect_log", "data": {"type": "USAGE"}}).to_string(),
        ))
        .await
        .unwrap();
    assert_silent(&mut viewer, 200).await;

    send_sample(&mut reporter, "m1", BASE_TIME, "USAGE", json!({})).await;
    assert_eq!(next_json(&mut viewer).await["data"]["machine_id"], "m1");

    let stats = hub.dispatcher.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.relayed, 1);
}

#[tokio::test]
async fn test_unregistered_machine_id_in_sample_is_dropped() {
    let hub = spawn_test_hub().await;
    let mut viewer = connect_viewer(&hub, None).await;
    let mut reporter = connect_reporter(&hub, "m1").await;

    send_sample(&mut reporter, "ghost", BASE_TIME, "USAGE", json!({})).await;
    assert_silent(&mut viewer, 200).await;

    assert!(hub.registry().get("ghost").await.is_none());
    assert_eq!(hub.dispatcher.stats().dropped, 1);
}

#[tokio::test]
async fn test_second_reporter_supersedes_first() {
    let hub = spawn_test_hub().await;
    let mut viewer = connect_viewer(&hub, None).await;
    let mut first = connect_reporter(&hub, "m1").await;

    send_sample(&mut first, "m1", BASE_TIME - 1, "USAGE", json!({"from": 1})).await;
    next_json(&mut viewer).await;

    let mut second = connect_reporter(&hub, "m1").await;

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match first.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "superseded reporter was not closed");

    send_sample(&mut second, "m1", BASE_TIME, "USAGE", json!({"from": 2})).await;
    let frame = next_json(&mut viewer).await;
    let logs = frame["data"]["logs"].as_object().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[&BASE_TIME.to_string()]["data"]["from"], 2);
}

#[tokio::test]
async fn test_disconnect_detaches_session() {
    let hub = &spawn_test_hub().await;
    let mut reporter = connect_reporter(hub, "m1").await;
    send_sample(&mut reporter, "m1", BASE_TIME, "USAGE", json!({})).await;

    wait_until(|| async move {
        match hub.registry().get("m1").await {
            Some(session) => session.snapshot().await.len() == 1,
            None => false,
        }
    })
    .await;

    reporter.close(None).await.unwrap();

    wait_until(|| async move {
        match hub.registry().get("m1").await {
            Some(session) => matches!(session.status().await, SessionStatus::Detached { .. }),
            None => false,
        }
    })
    .await;

    // Reconnecting within the grace period picks up the window.
    let _reporter = connect_reporter(hub, "m1").await;
    let session = hub.registry().get("m1").await.unwrap();
    assert_eq!(session.snapshot().await.len(), 1);
}
