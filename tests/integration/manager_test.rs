//! Manager lifecycle tests over the in-memory transport

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use ws_manager::auth::AuthConfig;
use ws_manager::connection::{ConnectionOptions, ConnectionState, EventPayload};
use ws_manager::testing::{MockHttpClient, MockTransport};
use ws_manager::ws::WsError;
use ws_manager::WsManager;

const URL: &str = "wss://stream.example.com/ws";

/// Let spawned tasks run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn token_auth() -> AuthConfig {
    AuthConfig::new("https://auth.example.com/token")
        .token_path("token")
        .query_param("token")
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_connection() {
    let (transport, _links) = MockTransport::new();
    let manager = WsManager::with_parts(transport.clone(), MockHttpClient::token("abc"));

    let (a, b) = tokio::join!(
        manager.connect(URL, ConnectionOptions::new()),
        manager.connect(URL, ConnectionOptions::new())
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.ptr_eq(&b));
    assert_eq!(transport.handshakes(), 1);
    assert_eq!(manager.keys().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dedup_uses_augmented_url() {
    let (transport, mut links) = MockTransport::new();
    let manager = WsManager::with_parts(transport.clone(), MockHttpClient::token("abc"));
    let options = || ConnectionOptions::new().auth(token_auth());

    let first = manager.connect(URL, options()).await.unwrap();
    let second = manager.connect(URL, options()).await.unwrap();

    assert!(first.ptr_eq(&second));
    assert_eq!(first.key().as_str(), "wss://stream.example.com/ws?token=abc");
    assert_eq!(links.recv().await.unwrap().target.url, first.key().as_str());
    assert_eq!(transport.handshakes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_unknown_key_is_not_connected() {
    let (transport, _links) = MockTransport::new();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));

    let error = assert_err!(manager.send("wss://nowhere/ws", &json!({"a": 1})).await);
    assert_eq!(error, WsError::NotConnected("wss://nowhere/ws".into()));
}

#[tokio::test(start_paused = true)]
async fn test_send_before_open_writes_nothing() {
    let (transport, mut links) = MockTransport::new();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));

    manager.connect(URL, ConnectionOptions::new()).await.unwrap();
    let link = links.recv().await.unwrap();

    let result = manager.send(URL, &json!({"a": 1})).await;
    assert!(matches!(result, Err(WsError::NotConnected(_))));
    assert!(link.sink.sent().is_empty());

    link.open().await;
    settle().await;
    assert_ok!(manager.send(URL, &json!({"a": 1})).await);
    assert_eq!(link.sink.sent(), vec![r#"{"a":1}"#.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_auth_message_sent_on_open() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = opened.clone();

    let options = ConnectionOptions::new()
        .auth_message(json!({"op": "auth", "key": "k"}))
        .on_open(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let handle = manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();
    settle().await;

    assert_eq!(handle.state(), ConnectionState::Open);
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(link.sink.sent(), vec![r#"{"op":"auth","key":"k"}"#.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_uses_original_url_and_fresh_credentials() {
    let (transport, mut links) = MockTransport::new();
    let http = MockHttpClient::numbered_tokens();
    let manager = WsManager::with_parts(transport.clone(), http.clone());

    let options = ConnectionOptions::new()
        .auth(token_auth())
        .auto_reconnect(true)
        .reconnect_interval(Duration::from_millis(100));
    let first = manager.connect(URL, options).await.unwrap();
    assert_eq!(first.key().as_str(), "wss://stream.example.com/ws?token=t1");

    let link = links.recv().await.unwrap();
    link.open().await;
    link.close(1001, "going away").await;
    settle().await;

    assert!(!manager.is_connected(first.key().as_str()).await);
    assert!(manager.is_reconnect_pending(first.key().as_str()));
    assert_eq!(first.state(), ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(transport.handshakes(), 1);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(transport.handshakes(), 2);
    assert_eq!(http.calls(), 2);

    let relink = links.recv().await.unwrap();
    assert_eq!(relink.target.url, "wss://stream.example.com/ws?token=t2");
    assert!(manager.is_connected("wss://stream.example.com/ws?token=t2").await);
    assert!(!manager.is_reconnect_pending(first.key().as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_no_reconnect_when_disabled() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport.clone(), MockHttpClient::token("abc"));

    manager.connect(URL, ConnectionOptions::new()).await.unwrap();
    let link = links.recv().await.unwrap();
    link.close(1000, "").await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(transport.handshakes(), 1);
    assert!(!manager.is_connected(URL).await);
    assert!(!manager.is_reconnect_pending(URL));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_pending_reconnect() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport.clone(), MockHttpClient::token("abc"));

    let options = ConnectionOptions::new()
        .auto_reconnect(true)
        .reconnect_interval(Duration::from_millis(100));
    manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();
    link.close(1006, "").await;
    settle().await;
    assert!(manager.is_reconnect_pending(URL));

    assert!(manager.close(URL).await);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(transport.handshakes(), 1);
    assert!(links.try_recv().is_err());
    assert!(!manager.is_reconnect_pending(URL));
    assert!(!manager.close(URL).await);
}

#[tokio::test(start_paused = true)]
async fn test_close_during_credential_fetch_aborts_reconnect() {
    let (transport, mut links) = MockTransport::auto_open();
    let http = MockHttpClient::delayed(Duration::from_millis(50), |n| {
        Ok(ws_manager::auth::HttpResponse::json(json!({ "token": format!("t{}", n + 1) })))
    });
    let manager = WsManager::with_parts(transport.clone(), http.clone());

    let options = ConnectionOptions::new()
        .auth(token_auth())
        .auto_reconnect(true)
        .reconnect_interval(Duration::from_millis(100));
    let first = manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();
    link.close(1006, "").await;

    // Timer fires at +100ms, the fetch is in flight until +150ms
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(http.calls(), 2);
    assert!(manager.close(first.key().as_str()).await);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.handshakes(), 1);
    assert!(manager.keys().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_close_all_closes_everything() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));
    let options = || {
        ConnectionOptions::new()
            .auto_reconnect(true)
            .reconnect_interval(Duration::from_millis(100))
    };

    manager.connect("wss://a/ws", options()).await.unwrap();
    manager.connect("wss://b/ws", options()).await.unwrap();
    let a = links.recv().await.unwrap();
    let b = links.recv().await.unwrap();
    assert_eq!(manager.keys().await.len(), 2);

    manager.close_all().await;

    assert!(manager.keys().await.is_empty());
    assert!(a.sink.close_requested());
    assert!(b.sink.close_requested());

    // Close events arriving afterwards must not revive anything
    a.close(1000, "").await;
    b.close(1000, "").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(manager.keys().await.is_empty());
    assert!(links.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_error_reaches_callback_then_close_removes() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();

    let options = ConnectionOptions::new().on_error(move |e| sink.lock().unwrap().push(e.clone()));
    let handle = manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();

    link.error("connection reset").await;
    settle().await;
    assert_eq!(handle.state(), ConnectionState::Error);
    assert!(manager.is_connected(URL).await);

    link.close(1006, "").await;
    settle().await;
    assert_eq!(
        errors.lock().unwrap().clone(),
        vec![WsError::Transport("connection reset".into())]
    );
    assert_eq!(handle.state(), ConnectionState::Closed);
    assert!(!manager.is_connected(URL).await);
}

#[tokio::test(start_paused = true)]
async fn test_event_listeners() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));
    let seen = Arc::new(Mutex::new(Vec::new()));

    manager.connect(URL, ConnectionOptions::new()).await.unwrap();
    let link = links.recv().await.unwrap();
    settle().await;

    for event in ["message", "close"] {
        let seen = seen.clone();
        manager
            .on(URL, event, move |payload: &EventPayload| {
                seen.lock().unwrap().push(payload.clone())
            })
            .await
            .unwrap();
    }
    assert!(matches!(
        manager.on(URL, "bogus", |_: &EventPayload| {}).await,
        Err(WsError::UnknownEvent(_))
    ));
    assert!(matches!(
        manager.on("wss://nowhere/ws", "open", |_: &EventPayload| {}).await,
        Err(WsError::NotConnected(_))
    ));

    link.message(r#"{"hello":1}"#).await;
    link.close(1000, "bye").await;
    settle().await;

    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![
            EventPayload::Message(r#"{"hello":1}"#.into()),
            EventPayload::Close {
                code: 1000,
                reason: "bye".into()
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_credential_fetch_connects_without_token() {
    let (transport, mut links) = MockTransport::new();
    let http = MockHttpClient::respond(|_| {
        Err(ws_manager::auth::AuthError::Request("refused".into()))
    });
    let manager = WsManager::with_parts(transport, http);

    let handle = manager
        .connect(URL, ConnectionOptions::new().auth(token_auth()))
        .await
        .unwrap();

    assert_eq!(handle.key().as_str(), URL);
    assert_eq!(links.recv().await.unwrap().target.url, URL);
}

#[tokio::test(start_paused = true)]
async fn test_session_cookies_and_bearer_header() {
    let (transport, mut links) = MockTransport::new();
    let http = MockHttpClient::respond(|n| {
        Ok(match n {
            0 => ws_manager::auth::HttpResponse::json(json!({"token": "abc"})),
            _ => ws_manager::auth::HttpResponse::with_cookies(vec![
                "sid=1; Path=/; HttpOnly; Secure".into(),
                "csrf=2; Max-Age=3600".into(),
            ]),
        })
    });
    let manager = WsManager::with_parts(transport, http);

    let options = ConnectionOptions::new()
        .auth(
            AuthConfig::new("https://auth.example.com/token")
                .token_path("token")
                .header_key("Authorization"),
        )
        .session_auth(AuthConfig::new("https://auth.example.com/login"));
    manager.connect(URL, options).await.unwrap();

    let target = links.recv().await.unwrap().target;
    assert_eq!(target.url, URL);
    assert_eq!(target.header("authorization"), Some("Bearer abc"));
    assert_eq!(target.header("Cookie"), Some("sid=1; csrf=2"));
}

#[tokio::test(start_paused = true)]
async fn test_close_before_open_suppresses_open() {
    let (transport, mut links) = MockTransport::new();
    let manager = WsManager::with_parts(transport, MockHttpClient::token("abc"));
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = opened.clone();

    let options = ConnectionOptions::new()
        .auth_message(json!({"op": "auth"}))
        .on_open(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let handle = manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();

    assert!(manager.close(URL).await);
    // Handshake completes after the caller gave up on it
    link.open().await;
    settle().await;

    assert_eq!(opened.load(Ordering::SeqCst), 0);
    assert!(link.sink.sent().is_empty());
    assert_ne!(handle.state(), ConnectionState::Open);
    assert!(!manager.is_connected(URL).await);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callbacks_do_not_stall_lifecycle() {
    let (transport, mut links) = MockTransport::auto_open();
    let manager = WsManager::with_parts(transport.clone(), MockHttpClient::token("abc"));

    let options = ConnectionOptions::new()
        .auto_reconnect(true)
        .reconnect_interval(Duration::from_millis(100))
        .on_open(|_| panic!("open callback bug"))
        .on_error(|_| panic!("error callback bug"));
    let handle = manager.connect(URL, options).await.unwrap();
    let link = links.recv().await.unwrap();
    settle().await;
    assert_eq!(handle.state(), ConnectionState::Open);

    link.error("reset").await;
    link.close(1006, "").await;
    settle().await;
    assert_eq!(handle.state(), ConnectionState::Closed);
    assert!(manager.is_reconnect_pending(URL));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(transport.handshakes(), 2);
    assert!(manager.is_connected(URL).await);
}
