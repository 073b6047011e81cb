mod support;

use std::time::Duration;

use config::HubConfig;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::header::AUTHORIZATION, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};

use support::{register, spawn_app, spawn_app_with, wait_for_connections, TestApp};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_with_query(app: &TestApp, token: &str) -> WsStream {
    let url = format!("{}/api/v1/chat/ws?token={}", app.base_ws, token);
    let (stream, _) = connect_async(url).await.expect("websocket connect");
    stream
}

async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let message = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("frame json");
        }
    }
}

/// 等待服务端关闭连接
async fn closed_by_server(ws: &mut WsStream, within: Duration) -> bool {
    let wait = async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
            }
        }
    };
    timeout(within, wait).await.unwrap_or(false)
}

#[tokio::test]
async fn websocket_broadcast_flow() {
    let app = spawn_app().await;
    let client = Client::new();

    let alice = register(&client, &app, "alice").await;
    let bob = register(&client, &app, "bob").await;

    let mut alice_ws = connect_with_query(&app, alice["access_token"].as_str().unwrap()).await;

    // bob 使用 Authorization 头
    let mut request = format!("{}/api/v1/chat/ws", app.base_ws)
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Bearer {}", bob["access_token"].as_str().unwrap())
            .parse()
            .unwrap(),
    );
    let (mut bob_ws, _) = connect_async(request).await.expect("bob connect");

    assert!(wait_for_connections(&app, 2).await);

    alice_ws
        .send(Message::Text(json!({"content": "hi"}).to_string().into()))
        .await
        .expect("send");

    for ws in [&mut alice_ws, &mut bob_ws] {
        let frame = next_json(ws).await;
        assert_eq!(frame["username"], "alice");
        assert_eq!(frame["content"], "hi");
        assert!(frame["time"].is_string());
    }

    let stored = app.messages.entries().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0.as_str(), alice["user"]["id"].as_str().unwrap());

    let history = client
        .get(format!("{}/api/v1/chat/messages?limit=10", app.base_http))
        .bearer_auth(bob["access_token"].as_str().unwrap())
        .send()
        .await
        .expect("history")
        .json::<Value>()
        .await
        .expect("history json");
    assert_eq!(history[0]["content"], "hi");
    assert_eq!(history[0]["username"], "alice");
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let app = spawn_app().await;
    let client = Client::new();
    let alice = register(&client, &app, "alice").await;
    let mut ws = connect_with_query(&app, alice["access_token"].as_str().unwrap()).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    ws.send(Message::Text(json!({"content": "after"}).to_string().into()))
        .await
        .unwrap();

    let frame = next_json(&mut ws).await;
    assert_eq!(frame["content"], "after");
    assert_eq!(app.messages.entries().await.len(), 1);
}

#[tokio::test]
async fn upgrade_without_valid_token_is_rejected() {
    let app = spawn_app().await;

    for url in [
        format!("{}/api/v1/chat/ws", app.base_ws),
        format!("{}/api/v1/chat/ws?token=garbage", app.base_ws),
    ] {
        match connect_async(url).await {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("expected http 401, got {:?}", other.map(|_| ())),
        }
    }
    assert!(app.chat.hub().is_empty().await);
}

#[tokio::test]
async fn client_close_unregisters_connection() {
    let app = spawn_app().await;
    let client = Client::new();
    let alice = register(&client, &app, "alice").await;
    let mut ws = connect_with_query(&app, alice["access_token"].as_str().unwrap()).await;

    assert!(wait_for_connections(&app, 1).await);

    ws.close(None).await.expect("close");
    assert!(wait_for_connections(&app, 0).await);
}

#[tokio::test]
async fn connection_limit_closes_extra_upgrades() {
    let app = spawn_app_with(HubConfig {
        outbound_capacity: 16,
        max_connections: Some(1),
        idle_timeout_seconds: None,
    })
    .await;
    let client = Client::new();
    let alice = register(&client, &app, "alice").await;
    let bob = register(&client, &app, "bob").await;

    let _alice_ws = connect_with_query(&app, alice["access_token"].as_str().unwrap()).await;
    assert!(wait_for_connections(&app, 1).await);

    let mut bob_ws = connect_with_query(&app, bob["access_token"].as_str().unwrap()).await;
    assert!(closed_by_server(&mut bob_ws, Duration::from_secs(2)).await);
    assert_eq!(app.chat.hub().len().await, 1);
}

#[tokio::test]
async fn idle_connection_is_closed() {
    let app = spawn_app_with(HubConfig {
        outbound_capacity: 16,
        max_connections: None,
        idle_timeout_seconds: Some(1),
    })
    .await;
    let client = Client::new();
    let alice = register(&client, &app, "alice").await;
    let mut ws = connect_with_query(&app, alice["access_token"].as_str().unwrap()).await;

    assert!(closed_by_server(&mut ws, Duration::from_secs(4)).await);
    assert!(wait_for_connections(&app, 0).await);
}
