//! 历史消息缓存实现
//!
//! Redis 版本把所有分页放在同一个哈希键下，字段为 `<limit>:<offset>`，
//! 清空缓存只需删除这个键。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use config::RedisConfig;
use domain::{ChatMessage, HistoryCache, StorageError};
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::revocation::{connection_manager, map_redis_err};

fn field(limit: u32, offset: u32) -> String {
    format!("{limit}:{offset}")
}

#[derive(Clone)]
pub struct RedisHistoryCache {
    connection: ConnectionManager,
    key: String,
}

impl RedisHistoryCache {
    pub async fn connect(config: &RedisConfig) -> Result<Self, StorageError> {
        let connection = connection_manager(&config.url).await?;
        info!(key = %config.history_key, "redis history cache connected");
        Ok(Self::new(connection, config.history_key.clone()))
    }

    pub fn new(connection: ConnectionManager, key: impl Into<String>) -> Self {
        Self {
            connection,
            key: key.into(),
        }
    }
}

#[async_trait]
impl HistoryCache for RedisHistoryCache {
    async fn get(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Option<Vec<ChatMessage>>, StorageError> {
        let mut conn = self.connection.clone();
        let cached: Option<String> = redis::cmd("HGET")
            .arg(&self.key)
            .arg(field(limit, offset))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        let Some(json) = cached else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(messages) => Ok(Some(messages)),
            Err(err) => {
                warn!(error = %err, limit, offset, "discarding unreadable history cache entry");
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        limit: u32,
        offset: u32,
        messages: &[ChatMessage],
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let json = serde_json::to_string(messages)
            .map_err(|err| StorageError::unavailable(err.to_string()))?;
        let mut conn = self.connection.clone();

        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(&self.key)
            .arg(field(limit, offset))
            .arg(json)
            .ignore()
            .cmd("EXPIRE")
            .arg(&self.key)
            .arg(ttl.as_secs().max(1))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;

        debug!(limit, offset, "history page cached");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: () = redis::cmd("DEL")
            .arg(&self.key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_err)?;
        Ok(())
    }
}

/// 内存历史缓存（用于测试和单机开发）
#[derive(Default)]
pub struct InMemoryHistoryCache {
    pages: RwLock<HashMap<(u32, u32), (Vec<ChatMessage>, Instant)>>,
}

impl InMemoryHistoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryCache for InMemoryHistoryCache {
    async fn get(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Option<Vec<ChatMessage>>, StorageError> {
        let pages = self.pages.read().await;
        Ok(pages
            .get(&(limit, offset))
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(messages, _)| messages.clone()))
    }

    async fn put(
        &self,
        limit: u32,
        offset: u32,
        messages: &[ChatMessage],
        ttl: Duration,
    ) -> Result<(), StorageError> {
        self.pages
            .write()
            .await
            .insert((limit, offset), (messages.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.pages.write().await.clear();
        Ok(())
    }
}
