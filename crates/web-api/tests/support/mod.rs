#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{
    AuthService, AuthServiceDependencies, CachedMessageStore, ChatService, Clock, ConnectionHub,
    SystemClock, TokenService, UserService, UserServiceDependencies,
};
use config::{HubConfig, JwtConfig};
use infrastructure::{
    BcryptPasswordHasher, InMemoryCredentialStore, InMemoryHistoryCache, InMemoryMessageStore,
    InMemoryRevocationStore,
};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot, time::sleep};
use web_api::{router, AppState};

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "integration-access-secret-0123456789abcdef".into(),
        refresh_secret: "integration-refresh-secret-0123456789abcdef".into(),
        access_ttl_minutes: 15,
        refresh_ttl_minutes: 60 * 24,
        cookie_name: "token".into(),
    }
}

pub struct TestApp {
    pub base_http: String,
    pub base_ws: String,
    pub messages: Arc<InMemoryMessageStore>,
    pub chat: Arc<ChatService>,
    pub revocations: Arc<InMemoryRevocationStore>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(HubConfig::default()).await
}

pub async fn spawn_app_with(hub: HubConfig) -> TestApp {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let revocations = Arc::new(InMemoryRevocationStore::new());
    let messages = Arc::new(InMemoryMessageStore::new());
    let jwt = jwt_config();

    let tokens = Arc::new(TokenService::new(&jwt, revocations.clone(), clock.clone()));
    let credentials = Arc::new(InMemoryCredentialStore::new());
    let hasher = Arc::new(BcryptPasswordHasher::new(Some(4)));
    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        credentials: credentials.clone(),
        password_hasher: hasher.clone(),
        tokens: tokens.clone(),
    }));
    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        credentials,
        password_hasher: hasher,
        tokens,
    }));
    let history = Arc::new(CachedMessageStore::new(
        messages.clone(),
        Arc::new(InMemoryHistoryCache::new()),
        Duration::from_secs(300),
    ));
    let chat = Arc::new(ChatService::new(
        Arc::new(ConnectionHub::from_config(&hub)),
        history,
        clock,
        hub.idle_timeout_seconds.map(Duration::from_secs),
    ));

    let state = AppState::new(
        auth_service,
        user_service,
        chat.clone(),
        jwt.cookie_name.clone(),
    );
    let app = router(state, &["*".to_owned()]);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    // 等待服务器启动
    sleep(Duration::from_millis(50)).await;

    TestApp {
        base_http: format!("http://{}", addr),
        base_ws: format!("ws://{}", addr),
        messages,
        chat,
        revocations,
        shutdown: Some(shutdown_tx),
    }
}

pub async fn register(client: &Client, app: &TestApp, username: &str) -> Value {
    let response = client
        .post(format!("{}/api/v1/auth/register", app.base_http))
        .json(&json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "secret-password"
        }))
        .send()
        .await
        .expect("register user");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    response.json::<Value>().await.expect("register json")
}

/// 等待连接中心的在线连接数达到期望值，最多约一秒
pub async fn wait_for_connections(app: &TestApp, expected: usize) -> bool {
    for _ in 0..50 {
        if app.chat.hub().len().await == expected {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}
