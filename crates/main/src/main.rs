//! 主应用程序入口
//!
//! 加载配置，连接 PostgreSQL 与 Redis，启动 Axum Web API 服务。

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use application::{
    AuthService, AuthServiceDependencies, CachedMessageStore, ChatService, Clock, SystemClock,
    TokenService, UserService, UserServiceDependencies,
};
use config::AppConfig;
use domain::{CredentialStore, MessageStore, PasswordHasher, RevocationStore};
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, PgCredentialStore, PgMessageStore, RedisHistoryCache,
    RedisRevocationStore, MIGRATOR,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let pg_pool = create_pg_pool(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to postgres")?;
    MIGRATOR.run(&pg_pool).await.context("failed to run migrations")?;

    let revocations: Arc<dyn RevocationStore> = Arc::new(
        RedisRevocationStore::connect(&config.redis)
            .await
            .context("failed to connect to redis")?,
    );
    let credentials: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pg_pool.clone()));
    let mut messages: Arc<dyn MessageStore> = Arc::new(PgMessageStore::new(pg_pool));
    if config.redis.history_cache_seconds > 0 {
        let cache = RedisHistoryCache::connect(&config.redis)
            .await
            .context("failed to connect history cache")?;
        messages = Arc::new(CachedMessageStore::new(
            messages,
            Arc::new(cache),
            Duration::from_secs(config.redis.history_cache_seconds),
        ));
    }
    let password_hasher: Arc<dyn PasswordHasher> =
        Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let tokens = Arc::new(TokenService::new(&config.jwt, revocations, clock.clone()));
    let auth_service = Arc::new(AuthService::new(AuthServiceDependencies {
        credentials: credentials.clone(),
        password_hasher: password_hasher.clone(),
        tokens: tokens.clone(),
    }));
    let user_service = Arc::new(UserService::new(UserServiceDependencies {
        credentials,
        password_hasher,
        tokens,
    }));
    let chat_service = Arc::new(ChatService::from_config(&config.hub, messages, clock));

    let state = AppState::new(
        auth_service,
        user_service,
        chat_service,
        config.jwt.cookie_name.clone(),
    );
    let app = router(state, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "聊天服务器已启动");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
