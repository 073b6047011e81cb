//! 密码服务
//!
//! 凭证校验器接口：哈希算法对本系统不透明。

use crate::errors::PasswordHasherError;
use async_trait::async_trait;

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    async fn hash(&self, plaintext: &str) -> Result<String, PasswordHasherError>;

    /// 摘要与明文是否匹配
    async fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, PasswordHasherError>;
}
