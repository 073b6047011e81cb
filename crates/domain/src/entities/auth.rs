//! 认证相关实体
//!
//! 定义主体标识、JWT 令牌声明、令牌对以及凭证记录。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 已认证主体的不透明标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// 令牌种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT令牌声明
///
/// `jti` 只出现在刷新令牌中，是吊销存储中比对的令牌标识。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// 主题（主体ID）
    pub sub: PrincipalId,
    /// 签发时间
    pub iat: i64,
    /// 过期时间
    pub exp: i64,
    /// 令牌种类
    pub token_type: TokenKind,
    /// 刷新令牌唯一标识
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl Claims {
    /// 声明的形状是否与期望的令牌种类一致
    pub fn matches_kind(&self, expected: TokenKind) -> bool {
        match expected {
            TokenKind::Access => self.token_type == TokenKind::Access && self.jti.is_none(),
            TokenKind::Refresh => self.token_type == TokenKind::Refresh && self.jti.is_some(),
        }
    }
}

/// 令牌对
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// 访问令牌有效期（秒）
    pub expires_in: i64,
}

/// 凭证存储中的用户记录
#[derive(Debug, Clone)]
pub struct UserCredential {
    pub subject: PrincipalId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// 注册时写入凭证存储的新用户
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// 用户资料的修改项，`None` 表示保持原值
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password_hash.is_none()
    }
}

/// 对外暴露的用户资料（不含密码摘要）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: PrincipalId,
    pub username: String,
    pub email: String,
}

impl From<&UserCredential> for UserProfile {
    fn from(credential: &UserCredential) -> Self {
        Self {
            id: credential.subject.clone(),
            username: credential.username.clone(),
            email: credential.email.clone(),
        }
    }
}
