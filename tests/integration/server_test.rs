//! Broadcast server over real sockets

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use ws_manager::server::BroadcastServer;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> BroadcastServer {
    BroadcastServer::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
        .await
        .unwrap()
}

async fn join(server: &BroadcastServer) -> Client {
    let url = format!("ws://{}", server.local_addr());
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn next_frame(client: &mut Client) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .unwrap();
    match msg {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("unexpected frame {:?}", other),
    }
}

#[tokio::test]
async fn test_new_peer_gets_empty_slot() {
    let server = start().await;
    let mut client = join(&server).await;

    assert_eq!(next_frame(&mut client).await, json!({"lastMessage": ""}));
}

#[tokio::test]
async fn test_message_is_rebroadcast_to_all_peers() {
    let server = start().await;
    let mut a = join(&server).await;
    let mut b = join(&server).await;
    next_frame(&mut a).await;
    next_frame(&mut b).await;

    a.send(Message::Text("hello".into())).await.unwrap();

    assert_eq!(next_frame(&mut a).await, json!({"lastMessage": "hello"}));
    assert_eq!(next_frame(&mut b).await, json!({"lastMessage": "hello"}));
    assert_eq!(server.last_message().await, "hello");
}

#[tokio::test]
async fn test_late_joiner_sees_last_message() {
    let server = start().await;
    let mut a = join(&server).await;
    next_frame(&mut a).await;

    a.send(Message::Text("first".into())).await.unwrap();
    next_frame(&mut a).await;
    a.send(Message::Text("second".into())).await.unwrap();
    next_frame(&mut a).await;

    let mut late = join(&server).await;
    assert_eq!(next_frame(&mut late).await, json!({"lastMessage": "second"}));
}

#[tokio::test]
async fn test_departed_peer_is_dropped() {
    let server = start().await;
    let mut a = join(&server).await;
    next_frame(&mut a).await;
    assert_eq!(server.peer_count().await, 1);

    a.close(None).await.unwrap();
    for _ in 0..50 {
        if server.peer_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.peer_count().await, 0);
}
