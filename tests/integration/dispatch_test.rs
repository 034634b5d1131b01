//! Inbound dispatch through a live manager connection

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ws_manager::connection::{ConnectionHandle, ConnectionOptions, ConnectionState};
use ws_manager::testing::{MockHttpClient, MockLink, MockTransport};
use ws_manager::WsManager;

const URL: &str = "wss://rpc.example.com/ws";

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn open_connection(options: ConnectionOptions) -> (WsManager, ConnectionHandle, MockLink) {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("unused"));
    let handle = manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();
    settle().await;
    (manager, handle, link)
}

fn recording_options() -> (ConnectionOptions, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let options = ConnectionOptions::new().on_message(move |payload, _| {
        sink.lock().unwrap().push(payload.clone());
    });
    (options, seen)
}

#[tokio::test(start_paused = true)]
async fn test_function_receives_data_once() {
    let (options, seen) = recording_options();
    let (manager, _handle, link) = open_connection(options).await;
    let calls = Arc::new(Mutex::new(Vec::new()));

    let recorded = calls.clone();
    manager
        .register_function("echo", move |data: Value, _conn: ConnectionHandle| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(data);
                anyhow::Ok(())
            }
        })
        .await;

    link.message(r#"{"function":"echo","data":"x"}"#).await;
    settle().await;

    assert_eq!(calls.lock().unwrap().clone(), vec![json!("x")]);
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_skips_handlers_but_reaches_on_message() {
    let (options, seen) = recording_options();
    let (manager, _handle, link) = open_connection(options).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    manager
        .register_function("ping", move |_: Value, _: ConnectionHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { anyhow::Ok(()) }
        })
        .await;

    link.message(r#"{"type":"ping","function":"ping"}"#).await;
    link.message(r#"{"type":"heartbeat"}"#).await;
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_function_and_bad_json_keep_connection_open() {
    let (options, seen) = recording_options();
    let (manager, handle, link) = open_connection(options).await;

    link.message(r#"{"function":"missing","data":1}"#).await;
    link.message("not json").await;
    settle().await;

    assert_eq!(handle.state(), ConnectionState::Open);
    assert!(manager.is_connected(URL).await);
    assert_eq!(seen.lock().unwrap().clone(), vec![json!({"function":"missing","data":1})]);
}

#[tokio::test(start_paused = true)]
async fn test_failing_handler_does_not_stop_later_messages() {
    let (manager, _handle, link) = open_connection(ConnectionOptions::new()).await;
    let calls = Arc::new(AtomicUsize::new(0));

    manager
        .register_function("broken", |_: Value, _: ConnectionHandle| async {
            Err::<(), _>(anyhow::anyhow!("handler exploded"))
        })
        .await;
    let counter = calls.clone();
    manager
        .register_function("count", move |_: Value, _: ConnectionHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { anyhow::Ok(()) }
        })
        .await;

    link.message(r#"{"function":"broken"}"#).await;
    link.message(r#"{"function":"count"}"#).await;
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_handler_replies_through_connection() {
    let (manager, _handle, link) = open_connection(ConnectionOptions::new()).await;

    manager
        .register_function("echo", |data: Value, conn: ConnectionHandle| async move {
            conn.send_json(&json!({ "function": "echo", "data": data }))?;
            anyhow::Ok(())
        })
        .await;

    link.message(r#"{"function":"echo","data":{"v":7}}"#).await;
    settle().await;

    let sent = link.sink.sent();
    assert_eq!(sent.len(), 1);
    let reply: Value = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(reply, json!({"function":"echo","data":{"v":7}}));
}

#[tokio::test(start_paused = true)]
async fn test_middleware_rewrites_before_parse() {
    let (options, seen) = recording_options();
    let (manager, _handle, link) = open_connection(options).await;

    manager
        .use_middleware(|raw: String| async move { anyhow::Ok(raw.trim_start_matches("42").to_string()) })
        .await;
    manager
        .use_middleware(|raw: String| async move {
            if raw.contains("reject") {
                Err::<String, _>(anyhow::anyhow!("rejected"))
            } else {
                Ok(raw)
            }
        })
        .await;

    link.message(r#"42{"event":"tick","data":1}"#).await;
    link.message(r#"{"reject":true}"#).await;
    settle().await;

    assert_eq!(seen.lock().unwrap().clone(), vec![json!({"event":"tick","data":1})]);
}

#[tokio::test(start_paused = true)]
async fn test_unregistered_function_no_longer_runs() {
    let (manager, _handle, link) = open_connection(ConnectionOptions::new()).await;
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    manager
        .register_function("once", move |_: Value, _: ConnectionHandle| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { anyhow::Ok(()) }
        })
        .await;

    link.message(r#"{"function":"once"}"#).await;
    settle().await;
    assert!(manager.unregister_function("once").await);
    link.message(r#"{"function":"once"}"#).await;
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
