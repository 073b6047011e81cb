//! 领域错误定义
//!
//! 认证错误覆盖会话子系统的全部失败路径；存储错误由外部协作者返回。

use thiserror::Error;

/// 认证错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// 凭证错误，不区分“用户不存在”和“密码错误”
    #[error("invalid credentials")]
    AuthenticationFailed,
    /// 令牌已过期
    #[error("token expired")]
    TokenExpired,
    /// 签名错误、种类错误或格式错误
    #[error("invalid token")]
    TokenInvalid,
    /// 签名与有效期正确，但吊销存储中没有匹配记录
    #[error("token revoked")]
    TokenRevoked,
    /// 协作者 I/O 失败
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    /// 连接升级因认证失败被拒绝
    #[error("connection rejected")]
    ConnectionRejected,
    /// 内部错误（例如签名失败）
    #[error("internal error: {0}")]
    Internal(String),
}

/// 存储错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("record already exists")]
    Conflict,
}

impl StorageError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::StorageUnavailable(err.to_string())
    }
}

/// 密码哈希错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordHasherError {
    #[error("hash error: {0}")]
    Hash(String),
    #[error("verify error: {0}")]
    Verify(String),
}

impl PasswordHasherError {
    pub fn hash_error(message: impl Into<String>) -> Self {
        Self::Hash(message.into())
    }

    pub fn verify_error(message: impl Into<String>) -> Self {
        Self::Verify(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_maps_to_storage_unavailable() {
        let err: AuthError = StorageError::unavailable("connection refused").into();
        assert!(matches!(err, AuthError::StorageUnavailable(msg) if msg.contains("connection refused")));
    }
}
