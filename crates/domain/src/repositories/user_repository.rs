//! 凭证存储接口定义

use crate::entities::auth::{NewUser, PrincipalId, UserChanges, UserCredential};
use crate::errors::StorageError;
use async_trait::async_trait;

/// 凭证存储
///
/// 按邮箱或主体标识查找用户及其密码摘要。已软删除的用户对所有查询不可见，
/// 但其邮箱仍然占用唯一约束。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 根据邮箱查找用户
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, StorageError>;

    /// 根据主体标识查找用户
    async fn find_by_subject(
        &self,
        subject: &PrincipalId,
    ) -> Result<Option<UserCredential>, StorageError>;

    /// 创建新用户，邮箱重复时返回 `StorageError::Conflict`
    async fn create(&self, user: NewUser) -> Result<UserCredential, StorageError>;

    /// 按主体标识升序分页列出用户
    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<UserCredential>, StorageError>;

    /// 修改用户，用户不存在时返回 `Ok(None)`
    async fn update(
        &self,
        subject: &PrincipalId,
        changes: UserChanges,
    ) -> Result<Option<UserCredential>, StorageError>;

    /// 软删除用户，返回是否有记录被删除
    async fn soft_delete(&self, subject: &PrincipalId) -> Result<bool, StorageError>;
}
