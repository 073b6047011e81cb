//! 刷新令牌吊销存储实现
//!
//! 每个主体一条记录，键为 `<前缀><主体>`，值为当前有效的刷新令牌标识。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::RedisConfig;
use domain::{PrincipalId, RevocationStore, StorageError};
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

/// 仅当存储值等于给定标识时删除键
const COMPARE_AND_DELETE: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub(crate) fn map_redis_err(err: redis::RedisError) -> StorageError {
    StorageError::unavailable(err.to_string())
}

pub(crate) async fn connection_manager(url: &str) -> Result<ConnectionManager, StorageError> {
    let client = redis::Client::open(url).map_err(map_redis_err)?;
    client
        .get_connection_manager()
        .await
        .map_err(map_redis_err)
}

/// Redis 吊销存储
#[derive(Clone)]
pub struct RedisRevocationStore {
    connection: ConnectionManager,
    key_prefix: String,
    compare_and_delete: Arc<redis::Script>,
}

impl RedisRevocationStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let connection = connection_manager(&config.url).await?;

        info!(key_prefix = %config.key_prefix, "redis revocation store connected");
        Ok(Self::new(connection, config.key_prefix.clone()))
    }

    pub fn new(connection: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.into(),
            compare_and_delete: Arc::new(redis::Script::new(COMPARE_AND_DELETE)),
        }
    }

    fn key(&self, principal: &PrincipalId) -> String {
        format!("{}{}", self.key_prefix, principal)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn put(
        &self,
        principal: &PrincipalId,
        token_id: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        // EX 不接受 0
        let seconds = ttl.as_secs().max(1);

        let _: () = redis::cmd("SET")
            .arg(self.key(principal))
            .arg(token_id)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        debug!(user_id = %principal, ttl_seconds = seconds, "revocation record stored");
        Ok(())
    }

    async fn get(&self, principal: &PrincipalId) -> Result<Option<String>, StorageError> {
        let mut conn = self.connection.clone();
        redis::cmd("GET")
            .arg(self.key(principal))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)
    }

    async fn delete(&self, principal: &PrincipalId) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(self.key(principal))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }

    async fn consume(
        &self,
        principal: &PrincipalId,
        token_id: &str,
    ) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .compare_and_delete
            .key(self.key(principal))
            .arg(token_id)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(removed == 1)
    }
}

struct Record {
    token_id: String,
    expires_at: Instant,
}

/// 内存吊销存储（用于测试和单机开发）
#[derive(Default)]
pub struct InMemoryRevocationStore {
    records: RwLock<HashMap<PrincipalId, Record>>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn put(
        &self,
        principal: &PrincipalId,
        token_id: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        self.records.write().await.insert(
            principal.clone(),
            Record {
                token_id: token_id.to_owned(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, principal: &PrincipalId) -> Result<Option<String>, StorageError> {
        let records = self.records.read().await;
        Ok(records
            .get(principal)
            .filter(|record| record.expires_at > Instant::now())
            .map(|record| record.token_id.clone()))
    }

    async fn delete(&self, principal: &PrincipalId) -> Result<(), StorageError> {
        self.records.write().await.remove(principal);
        Ok(())
    }

    async fn consume(
        &self,
        principal: &PrincipalId,
        token_id: &str,
    ) -> Result<bool, StorageError> {
        let mut records = self.records.write().await;
        let current = records
            .get(principal)
            .is_some_and(|record| record.token_id == token_id && record.expires_at > Instant::now());
        if current {
            records.remove(principal);
        }
        Ok(current)
    }
}
