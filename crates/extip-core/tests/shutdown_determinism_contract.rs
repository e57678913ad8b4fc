//! Architectural Contract Test: Shutdown Determinism
//!
//! This test verifies that shutdown is cooperative and complete.
//!
//! Constraints verified:
//! - Engine terminates on shutdown signal while waiting
//! - A pass in flight is finished before the engine stops
//! - No pass starts after the stop signal is observed
//! - Dropping the shutdown sender also stops the engine
//!
//! If this test fails, someone has added:
//! - Detached background tasks
//! - Tasks that ignore cancellation
//! - Mid-pass cancellation that can leave Services half-written

mod common;

use common::*;
use extip_core::engine::{EngineEvent, LoopState};
use extip_core::ReconcileEngine;
use std::time::Duration;

#[tokio::test]
async fn shutdown_signal_terminates_engine() {
    let interfaces = ScriptedInterfaces::with(&[("eth0", "10.0.0.5")]);
    let store = MockServiceStore::new(Vec::new());

    let (mut engine, _events) = ReconcileEngine::new(
        Box::new(interfaces),
        Box::new(store),
        minimal_config(),
    )
    .expect("engine construction succeeds");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Start engine
    let engine_handle = tokio::spawn(async move {
        let result = engine.run_with_shutdown(Some(shutdown_rx)).await;
        (result, engine.state())
    });

    // Wait for startup
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Send shutdown signal
    let shutdown_result = shutdown_tx.send(());
    assert!(shutdown_result.is_ok(), "shutdown signal send succeeds");

    // Wait for engine to stop
    let result = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;

    assert!(result.is_ok(), "Engine should terminate within 5 seconds");

    let (engine_result, state) = result.unwrap().unwrap();
    assert!(
        engine_result.is_ok(),
        "Engine should shut down successfully: {:?}",
        engine_result
    );
    assert_eq!(state, LoopState::Terminated);
}

#[tokio::test]
async fn in_flight_pass_completes_before_stop() {
    let interfaces = ScriptedInterfaces::with(&[("eth0", "10.0.0.5")]);
    let store = MockServiceStore::new(vec![
        service("default", "a", Some("eth0"), &[]),
        service("default", "b", Some("eth0"), &[]),
    ]);
    store.set_replace_delay(Duration::from_millis(150));

    let (mut engine, mut events) = ReconcileEngine::new(
        Box::new(interfaces),
        Box::new(store.clone()),
        minimal_config(),
    )
    .unwrap();
    let trigger = engine.trigger();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    // Stop while the startup pass is inside the first slow write, with a
    // trigger already pending
    tokio::time::sleep(Duration::from_millis(50)).await;
    trigger.trigger();
    shutdown_tx.send(()).unwrap();

    engine_handle.await.unwrap().unwrap();

    assert_eq!(store.replace_call_count(), 2, "both writes of the pass complete");
    assert_eq!(store.external_ip_set("default", "b"), ip_set(&["10.0.0.5"]));

    let events = drain_events(&mut events);
    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PassStarted { .. }))
        .count();
    assert_eq!(started, 1, "stop wins over the pending trigger");

    let completed = events
        .iter()
        .position(|e| matches!(e, EngineEvent::PassCompleted { .. }))
        .expect("pass completed");
    let stopped = events
        .iter()
        .position(|e| matches!(e, EngineEvent::Stopped { .. }))
        .expect("engine stopped");
    assert!(completed < stopped);
}

#[tokio::test]
async fn dropped_shutdown_sender_stops_engine() {
    let interfaces = ScriptedInterfaces::new();
    let store = MockServiceStore::new(Vec::new());

    let (mut engine, _events) = ReconcileEngine::new(
        Box::new(interfaces),
        Box::new(store),
        minimal_config(),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let engine_handle =
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await });

    drop(shutdown_tx);

    let result = tokio::time::timeout(Duration::from_secs(5), engine_handle).await;
    assert!(result.is_ok(), "Engine should terminate when the sender is dropped");
    assert!(result.unwrap().unwrap().is_ok());
}

#[tokio::test]
async fn engine_is_waiting_before_run() {
    let (engine, _events) = ReconcileEngine::new(
        Box::new(ScriptedInterfaces::new()),
        Box::new(MockServiceStore::new(Vec::new())),
        minimal_config(),
    )
    .unwrap();

    assert_eq!(engine.state(), LoopState::Waiting);
    assert!(engine.cache().is_empty());
}
