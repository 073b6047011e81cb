//! 刷新令牌吊销存储接口定义

use crate::entities::auth::PrincipalId;
use crate::errors::StorageError;
use async_trait::async_trait;
use std::time::Duration;

/// 吊销存储
///
/// 每个主体最多保存一条记录：当前唯一有效的刷新令牌标识，带过期时间。
/// 写入新记录会覆盖旧记录，从而使旧的刷新令牌失效。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// 写入（覆盖）主体的刷新令牌标识
    async fn put(
        &self,
        principal: &PrincipalId,
        token_id: &str,
        ttl: Duration,
    ) -> Result<(), StorageError>;

    /// 读取主体当前的刷新令牌标识
    async fn get(&self, principal: &PrincipalId) -> Result<Option<String>, StorageError>;

    /// 删除主体的记录
    async fn delete(&self, principal: &PrincipalId) -> Result<(), StorageError>;

    /// 原子地比较并删除：仅当存储的标识等于 `token_id` 时删除并返回 `true`
    async fn consume(&self, principal: &PrincipalId, token_id: &str)
        -> Result<bool, StorageError>;
}
