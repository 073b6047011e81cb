//! 双令牌服务
//!
//! 访问令牌无状态；刷新令牌的标识写入吊销存储，每个主体同一时刻只有一个
//! 有效的刷新令牌。轮换会先原子地消费旧记录再签发新令牌对，
//! 同一个刷新令牌最多只能成功轮换一次。

use std::sync::Arc;

use chrono::Duration;
use config::JwtConfig;
use domain::{AuthError, Claims, PrincipalId, RevocationStore, TokenKind, TokenPair};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub struct TokenService {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    validation: Validation,
    revocations: Arc<dyn RevocationStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        config: &JwtConfig,
        revocations: Arc<dyn RevocationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // 过期时间由注入的时钟判断
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            access: SigningKeys::from_secret(&config.access_secret),
            refresh: SigningKeys::from_secret(&config.refresh_secret),
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::minutes(config.refresh_ttl_minutes),
            validation,
            revocations,
            clock,
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(claims.token_type).encoding,
        )
        .map_err(|err| AuthError::Internal(format!("token signing failed: {err}")))
    }

    /// 访问令牌有效期（秒）
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// 签发访问令牌，无存储副作用
    pub fn issue_access_token(&self, principal: &PrincipalId) -> Result<String, AuthError> {
        let now = self.clock.now();
        self.sign(&Claims {
            sub: principal.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            token_type: TokenKind::Access,
            jti: None,
        })
    }

    /// 签发刷新令牌
    ///
    /// 吊销记录写入成功后才返回令牌；写入失败时不返回任何令牌。
    pub async fn issue_refresh_token(&self, principal: &PrincipalId) -> Result<String, AuthError> {
        let now = self.clock.now();
        let token_id = Uuid::new_v4().to_string();
        let token = self.sign(&Claims {
            sub: principal.clone(),
            iat: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            token_type: TokenKind::Refresh,
            jti: Some(token_id.clone()),
        })?;

        let ttl = self
            .refresh_ttl
            .to_std()
            .map_err(|err| AuthError::Internal(format!("invalid refresh lifetime: {err}")))?;

        self.revocations
            .put(principal, &token_id, ttl)
            .await
            .map_err(|err| {
                warn!(user_id = %principal, error = %err, "failed to store refresh token record");
                AuthError::from(err)
            })?;

        debug!(user_id = %principal, "refresh token issued");
        Ok(token)
    }

    /// 校验签名、种类和有效期
    pub fn validate_token(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.keys(expected).decoding, &self.validation)
            .map_err(|err| {
                debug!(kind = %expected, error = %err, "token rejected");
                AuthError::TokenInvalid
            })?
            .claims;

        if !claims.matches_kind(expected) {
            debug!(kind = %expected, actual = %claims.token_type, "token kind mismatch");
            return Err(AuthError::TokenInvalid);
        }

        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }

    /// 校验刷新令牌，并与吊销存储中的当前记录比对
    pub async fn validate_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.validate_token(token, TokenKind::Refresh)?;
        let token_id = claims.jti.as_deref().ok_or(AuthError::TokenInvalid)?;

        match self.revocations.get(&claims.sub).await? {
            Some(current) if current == token_id => Ok(claims),
            _ => {
                debug!(user_id = %claims.sub, "refresh token not current");
                Err(AuthError::TokenRevoked)
            }
        }
    }

    /// 签发新的访问令牌和刷新令牌
    pub async fn issue_pair(&self, principal: &PrincipalId) -> Result<TokenPair, AuthError> {
        let access_token = self.issue_access_token(principal)?;
        let refresh_token = self.issue_refresh_token(principal).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_seconds(),
        })
    }

    /// 用刷新令牌换取新的令牌对
    pub async fn rotate_tokens(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_token(refresh_token, TokenKind::Refresh)?;
        let token_id = claims.jti.as_deref().ok_or(AuthError::TokenInvalid)?;

        if !self.revocations.consume(&claims.sub, token_id).await? {
            warn!(user_id = %claims.sub, "stale refresh token presented for rotation");
            return Err(AuthError::TokenRevoked);
        }

        let pair = self.issue_pair(&claims.sub).await?;
        info!(user_id = %claims.sub, "tokens rotated");
        Ok(pair)
    }

    /// 删除主体的吊销记录，使其刷新令牌全部失效
    pub async fn invalidate(&self, principal: &PrincipalId) -> Result<(), AuthError> {
        self.revocations.delete(principal).await?;
        info!(user_id = %principal, "refresh token invalidated");
        Ok(())
    }
}
