//! 带分页缓存的消息存储
//!
//! 读历史时先查缓存，未命中再查底层存储并回填；写入新消息后清空缓存。
//! 缓存故障只记录日志，不影响读写结果。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ChatMessage, HistoryCache, MessageStore, PrincipalId, StorageError};
use tracing::{debug, warn};

pub struct CachedMessageStore {
    inner: Arc<dyn MessageStore>,
    cache: Arc<dyn HistoryCache>,
    ttl: Duration,
}

impl CachedMessageStore {
    pub fn new(inner: Arc<dyn MessageStore>, cache: Arc<dyn HistoryCache>, ttl: Duration) -> Self {
        Self { inner, cache, ttl }
    }
}

#[async_trait]
impl MessageStore for CachedMessageStore {
    async fn append(&self, sender: &PrincipalId, message: &ChatMessage) -> Result<(), StorageError> {
        self.inner.append(sender, message).await?;

        if let Err(err) = self.cache.clear().await {
            warn!(error = %err, "failed to clear history cache");
        }
        Ok(())
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, StorageError> {
        match self.cache.get(limit, offset).await {
            Ok(Some(messages)) => {
                debug!(limit, offset, "history served from cache");
                return Ok(messages);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "history cache read failed"),
        }

        let messages = self.inner.list(limit, offset).await?;
        if let Err(err) = self.cache.put(limit, offset, &messages, self.ttl).await {
            warn!(error = %err, "history cache write failed");
        }
        Ok(messages)
    }
}
