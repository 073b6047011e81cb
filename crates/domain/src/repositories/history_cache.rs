//! 历史消息缓存接口定义

use std::time::Duration;

use crate::entities::message::ChatMessage;
use crate::errors::StorageError;
use async_trait::async_trait;

/// 按分页参数缓存的历史消息
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait HistoryCache: Send + Sync {
    async fn get(&self, limit: u32, offset: u32)
        -> Result<Option<Vec<ChatMessage>>, StorageError>;

    async fn put(
        &self,
        limit: u32,
        offset: u32,
        messages: &[ChatMessage],
        ttl: Duration,
    ) -> Result<(), StorageError>;

    /// 丢弃所有分页缓存
    async fn clear(&self) -> Result<(), StorageError>;
}
