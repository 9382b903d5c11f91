//! End-to-end relay behaviour without a network in between
//!
//! Each test drives `RelayDispatcher::on_sample` with a manual clock, the same
//! path the WebSocket gateway takes for every `collect_log` frame.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use attestation_server::relay::{
    ConnectionHandle, DispatchOutcome, JanitorHandle, ManualClock, RelayDispatcher,
    SessionRegistry, SessionStatus, WindowPolicy,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

fn relay() -> (Arc<ManualClock>, RelayDispatcher) {
    let clock = Arc::new(ManualClock::new(0));
    let registry = Arc::new(SessionRegistry::new(WindowPolicy::default()));
    let dispatcher = RelayDispatcher::with_clock(registry, 64, clock.clone());
    (clock, dispatcher)
}

fn timestamps(samples: &[attestation_server::relay::Sample]) -> Vec<i64> {
    samples.iter().map(|s| s.timestamp).collect()
}

#[tokio::test]
async fn test_window_slides_over_eighteen_seconds() {
    let (clock, dispatcher) = relay();
    dispatcher
        .registry()
        .register("m1", ConnectionHandle::new())
        .await
        .unwrap();
    let mut updates = dispatcher.subscribe();

    for t in 100..=117 {
        clock.set(t);
        let outcome = dispatcher
            .on_sample("m1", t, "USAGE", json!({"cpu": t}))
            .await;
        assert_eq!(outcome, DispatchOutcome::Relayed { receivers: 1 });
    }

    let mut last = None;
    for _ in 100..=117 {
        last = Some(updates.try_recv().unwrap());
    }
    assert_matches!(updates.try_recv(), Err(TryRecvError::Empty));

    let last = last.unwrap();
    assert_eq!(last.machine_id, "m1");
    assert_eq!(timestamps(&last.logs), (102..=117).collect::<Vec<_>>());

    let session = dispatcher.registry().get("m1").await.unwrap();
    assert_eq!(session.snapshot().await.len(), 16);
}

#[tokio::test]
async fn test_duplicate_timestamp_overwrites() {
    let (clock, dispatcher) = relay();
    dispatcher
        .registry()
        .register("m2", ConnectionHandle::new())
        .await
        .unwrap();
    let mut updates = dispatcher.subscribe();
    clock.set(50);

    dispatcher
        .on_sample("m2", 50, "USAGE", json!({"cpu": 1}))
        .await;
    dispatcher
        .on_sample("m2", 50, "USAGE", json!({"cpu": 2}))
        .await;

    let first = updates.try_recv().unwrap();
    let second = updates.try_recv().unwrap();
    assert_eq!(first.logs.len(), 1);
    assert_eq!(second.logs.len(), 1);
    assert_eq!(second.logs[0].payload, json!({"cpu": 2}));
}

#[tokio::test]
async fn test_unregistered_machine_is_dropped() {
    let (clock, dispatcher) = relay();
    let mut updates = dispatcher.subscribe();
    clock.set(10);

    let outcome = dispatcher
        .on_sample("ghost", 10, "USAGE", json!({}))
        .await;

    assert_eq!(outcome, DispatchOutcome::Dropped);
    assert!(dispatcher.registry().get("ghost").await.is_none());
    assert!(dispatcher.registry().is_empty().await);
    assert_matches!(updates.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(dispatcher.stats().dropped, 1);
}

#[tokio::test]
async fn test_machines_are_isolated() {
    let (clock, dispatcher) = relay();
    for machine in ["a", "b"] {
        dispatcher
            .registry()
            .register(machine, ConnectionHandle::new())
            .await
            .unwrap();
    }

    for t in 0..5 {
        clock.set(t);
        dispatcher
            .on_sample("a", t, "USAGE", json!({"from": "a"}))
            .await;
        dispatcher
            .on_sample("b", t, "USAGE", json!({"from": "b"}))
            .await;
    }

    for machine in ["a", "b"] {
        let window = dispatcher
            .registry()
            .get(machine)
            .await
            .unwrap()
            .snapshot()
            .await;
        assert_eq!(timestamps(&window), vec![0, 1, 2, 3, 4]);
        assert!(window.iter().all(|s| s.payload["from"] == machine));
    }
}

#[tokio::test]
async fn test_reconnect_within_grace_keeps_window() {
    let (clock, dispatcher) = relay();
    let registry = dispatcher.registry().clone();
    let first = ConnectionHandle::new();
    registry.register("m1", first.clone()).await.unwrap();

    for t in 200..203 {
        clock.set(t);
        dispatcher.on_sample("m1", t, "USAGE", json!({})).await;
    }

    assert!(dispatcher.detach("m1", first.id()).await);
    let session = registry.get("m1").await.unwrap();
    assert_matches!(session.status().await, SessionStatus::Detached { since: 202 });

    // Samples are not accepted while detached.
    clock.set(203);
    assert_eq!(
        dispatcher.on_sample("m1", 203, "USAGE", json!({})).await,
        DispatchOutcome::Dropped
    );

    let janitor = JanitorHandle::spawn(
        registry.clone(),
        dispatcher.clock(),
        Duration::from_secs(30),
        Duration::from_secs(3600),
    );
    clock.set(232);
    assert!(janitor.sweep_now().await.unwrap().is_empty());

    registry.register("m1", ConnectionHandle::new()).await.unwrap();
    let window = registry.get("m1").await.unwrap().snapshot().await;
    assert_eq!(timestamps(&window), vec![200, 201, 202]);

    janitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_reconnect_after_grace_starts_empty() {
    let (clock, dispatcher) = relay();
    let registry = dispatcher.registry().clone();
    let connection = ConnectionHandle::new();
    registry.register("m1", connection.clone()).await.unwrap();

    clock.set(300);
    dispatcher.on_sample("m1", 300, "USAGE", json!({})).await;
    dispatcher.detach("m1", connection.id()).await;

    let janitor = JanitorHandle::spawn(
        registry.clone(),
        dispatcher.clock(),
        Duration::from_secs(30),
        Duration::from_secs(3600),
    );

    clock.set(330);
    assert!(janitor.sweep_now().await.unwrap().is_empty());

    clock.set(331);
    assert_eq!(janitor.sweep_now().await.unwrap(), vec!["m1".to_string()]);
    assert!(registry.get("m1").await.is_none());

    registry.register("m1", ConnectionHandle::new()).await.unwrap();
    assert!(registry.get("m1").await.unwrap().snapshot().await.is_empty());

    janitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stale_detach_is_ignored_after_takeover() {
    let (_, dispatcher) = relay();
    let registry = dispatcher.registry();
    let old = ConnectionHandle::new();
    let new = ConnectionHandle::new();

    registry.register("m1", old.clone()).await.unwrap();
    registry.register("m1", new.clone()).await.unwrap();

    // The superseded connection was told to close.
    tokio::time::timeout(Duration::from_secs(1), old.closed())
        .await
        .unwrap();

    assert!(!dispatcher.detach("m1", old.id()).await);
    let summary = registry.get("m1").await.unwrap().summary().await;
    assert_eq!(summary.status, SessionStatus::Attached);
    assert_eq!(summary.connection_id, new.id());
}
