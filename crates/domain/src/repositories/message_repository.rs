//! 消息存储接口定义

use crate::entities::auth::PrincipalId;
use crate::entities::message::ChatMessage;
use crate::errors::StorageError;
use async_trait::async_trait;

/// 聊天消息存储
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// 追加一条消息
    async fn append(&self, sender: &PrincipalId, message: &ChatMessage) -> Result<(), StorageError>;

    /// 分页读取历史消息，最新的在前
    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, StorageError>;
}
