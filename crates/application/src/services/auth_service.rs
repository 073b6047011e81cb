use std::sync::Arc;

use domain::{
    AuthError, CredentialStore, NewUser, PasswordHasher, PrincipalId, StorageError, TokenPair,
    UserProfile,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApplicationError;
use crate::services::{token_service::TokenService, validation};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

pub struct AuthServiceDependencies {
    pub credentials: Arc<dyn CredentialStore>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<TokenService>,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.deps.tokens
    }

    /// 校验邮箱和密码，返回主体标识
    ///
    /// 用户不存在、摘要不匹配、校验器出错都返回同一个 `AuthenticationFailed`。
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<PrincipalId, AuthError> {
        let credential = match self.deps.credentials.find_by_email(email).await {
            Ok(Some(credential)) => credential,
            Ok(None) => return Err(AuthError::AuthenticationFailed),
            Err(err) => {
                warn!(error = %err, "credential lookup failed");
                return Err(AuthError::AuthenticationFailed);
            }
        };

        match self
            .deps
            .password_hasher
            .verify(password, &credential.password_hash)
            .await
        {
            Ok(true) => Ok(credential.subject),
            Ok(false) => Err(AuthError::AuthenticationFailed),
            Err(err) => {
                warn!(user_id = %credential.subject, error = %err, "password verification failed");
                Err(AuthError::AuthenticationFailed)
            }
        }
    }

    pub async fn login(&self, request: LoginRequest) -> Result<TokenPair, ApplicationError> {
        let principal = self.authenticate(&request.email, &request.password).await?;
        let pair = self.deps.tokens.issue_pair(&principal).await?;
        info!(user_id = %principal, "user logged in");
        Ok(pair)
    }

    pub async fn register(
        &self,
        request: RegisterUserRequest,
    ) -> Result<RegisteredUser, ApplicationError> {
        let username = validation::username(&request.username)?;
        let email = validation::email(&request.email)?;
        let password = validation::password(&request.password)?;

        let password_hash = self.deps.password_hasher.hash(password).await?;

        let stored = self
            .deps
            .credentials
            .create(NewUser {
                username,
                email,
                password_hash,
            })
            .await
            .map_err(|err| match err {
                StorageError::Conflict => ApplicationError::UserAlreadyExists,
                other => ApplicationError::Storage(other),
            })?;

        let tokens = self.deps.tokens.issue_pair(&stored.subject).await?;
        info!(user_id = %stored.subject, username = %stored.username, "user registered");

        Ok(RegisteredUser {
            user: UserProfile::from(&stored),
            tokens,
        })
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApplicationError> {
        Ok(self.deps.tokens.rotate_tokens(refresh_token).await?)
    }

    pub async fn logout(&self, principal: &PrincipalId) -> Result<(), ApplicationError> {
        self.deps.tokens.invalidate(principal).await?;
        info!(user_id = %principal, "user logged out");
        Ok(())
    }

    pub async fn profile(&self, principal: &PrincipalId) -> Result<UserProfile, ApplicationError> {
        let credential = self
            .deps
            .credentials
            .find_by_subject(principal)
            .await?
            .ok_or(ApplicationError::UserNotFound)?;
        Ok(UserProfile::from(&credential))
    }
}
