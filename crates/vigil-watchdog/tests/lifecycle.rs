//! Lifecycle tests for the single-instance watchdog

mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::{data_is, wait_until, MockBackend, MockElement};
use vigil_core::{CoreError, EditorConfig, EditorSource};
use vigil_watchdog::{EditorWatchdog, WatchdogConfig, WatchdogError, WatchdogState};

fn data_source() -> EditorSource {
    EditorSource::Data(HashMap::from([("main".to_string(), String::new())]))
}

fn watchdog_with(backend: &Arc<MockBackend>) -> EditorWatchdog {
    let watchdog = EditorWatchdog::new(WatchdogConfig::default());
    watchdog.set_creator(backend.creator());
    watchdog.set_destructor(backend.destructor());
    watchdog
}

#[tokio::test(start_paused = true)]
async fn create_then_destroy() {
    let backend = MockBackend::new();
    let watchdog = watchdog_with(&backend);

    watchdog
        .create(data_source(), EditorConfig::default())
        .await
        .unwrap();
    assert_eq!(watchdog.state(), WatchdogState::Ready);
    assert!(watchdog.editor().is_some());
    assert!(watchdog.snapshot().is_some());
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);

    watchdog.destroy().await.unwrap();
    assert_eq!(watchdog.state(), WatchdogState::Destroyed);
    assert!(watchdog.editor().is_none());
    assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn create_fires_state_change_to_ready() {
    let backend = MockBackend::new();
    let watchdog = watchdog_with(&backend);

    let states = Arc::new(Mutex::new(Vec::new()));
    let states2 = states.clone();
    watchdog.events().state_change.add(move |event| {
        states2.lock().push(event.state);
    });

    watchdog
        .create(data_source(), EditorConfig::default())
        .await
        .unwrap();
    watchdog.destroy().await.unwrap();

    assert_eq!(
        states.lock().clone(),
        vec![WatchdogState::Ready, WatchdogState::Destroyed]
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_create_and_destroy_serialize() {
    let backend = MockBackend::new();
    *backend.create_delay.lock() = Some(Duration::from_millis(50));
    let watchdog = watchdog_with(&backend);

    let create_fut = watchdog.create(data_source(), EditorConfig::default());
    let destroy_fut = watchdog.destroy();
    let (created, destroyed) = tokio::join!(create_fut, destroy_fut);
    created.unwrap();
    destroyed.unwrap();

    // Exactly one full create, then one full destroy, never interleaved.
    assert_eq!(backend.log.lock().clone(), vec!["create", "destroy"]);
    assert_eq!(backend.created.load(Ordering::SeqCst), 1);
    assert_eq!(backend.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(watchdog.state(), WatchdogState::Destroyed);
}

#[tokio::test(start_paused = true)]
async fn element_sources_build_a_default_root() {
    let backend = MockBackend::new();
    let watchdog = watchdog_with(&backend);

    watchdog
        .create(
            EditorSource::Element(Arc::new(MockElement)),
            EditorConfig::default(),
        )
        .await
        .unwrap();
    let editor = backend.latest();
    assert_eq!(editor.content("main"), json!(""));
}

#[tokio::test(start_paused = true)]
async fn destroy_cancels_the_pending_save_without_flushing() {
    let backend = MockBackend::new();
    let watchdog = EditorWatchdog::new(WatchdogConfig {
        save_interval: Duration::from_secs(5),
        ..Default::default()
    });
    watchdog.set_creator(backend.creator());
    watchdog.set_destructor(backend.destructor());

    watchdog
        .create(data_source(), EditorConfig::default())
        .await
        .unwrap();

    let editor = backend.latest();
    // Leading-edge save captures v1 immediately.
    editor.write("main", json!("v1"));
    wait_until(|| data_is(&watchdog, "main", &json!("v1"))).await;

    // v2 lands inside the interval and only schedules a trailing save,
    // which destroy drops rather than flushes.
    editor.write("main", json!("v2"));
    watchdog.destroy().await.unwrap();

    let snapshot = watchdog.snapshot().unwrap();
    assert_eq!(snapshot.roots["main"].content, json!("v1"));
}

#[tokio::test(start_paused = true)]
async fn destructor_failure_propagates_from_destroy() {
    let backend = MockBackend::new();
    let watchdog = watchdog_with(&backend);

    watchdog
        .create(data_source(), EditorConfig::default())
        .await
        .unwrap();
    backend.fail_destroys.store(1, Ordering::SeqCst);

    let result = watchdog.destroy().await;
    assert_eq!(
        result.unwrap_err(),
        WatchdogError::Core(CoreError::destruction("injected destructor failure"))
    );
    assert_eq!(watchdog.state(), WatchdogState::Destroyed);
}
