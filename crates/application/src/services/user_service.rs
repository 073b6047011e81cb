use std::sync::Arc;

use domain::{
    CredentialStore, NewUser, PasswordHasher, PrincipalId, StorageError, UserChanges, UserProfile,
};
use tracing::info;

use crate::error::ApplicationError;
use crate::services::{token_service::TokenService, validation};

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// 整体替换：所有字段都必须提供
#[derive(Debug, Clone)]
pub struct ReplaceUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// 部分修改：只处理提供的字段
#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

pub struct UserServiceDependencies {
    pub credentials: Arc<dyn CredentialStore>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<TokenService>,
}

/// 用户管理
///
/// 任何已登录主体都可以查询和创建用户；修改与删除只允许作用于自己。
pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn list(
        &self,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<UserProfile>, ApplicationError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0);

        let users = self.deps.credentials.list(limit, offset).await?;
        Ok(users.iter().map(UserProfile::from).collect())
    }

    pub async fn get(&self, id: &PrincipalId) -> Result<UserProfile, ApplicationError> {
        let credential = self
            .deps
            .credentials
            .find_by_subject(id)
            .await?
            .ok_or(ApplicationError::UserNotFound)?;
        Ok(UserProfile::from(&credential))
    }

    pub async fn create(&self, request: CreateUserRequest) -> Result<UserProfile, ApplicationError> {
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
            .map_err(conflict_as_user_exists)?;

        info!(user_id = %stored.subject, "user created");
        Ok(UserProfile::from(&stored))
    }

    pub async fn replace(
        &self,
        actor: &PrincipalId,
        id: &PrincipalId,
        request: ReplaceUserRequest,
    ) -> Result<UserProfile, ApplicationError> {
        self.update(
            actor,
            id,
            UpdateUserRequest {
                username: Some(request.username),
                email: Some(request.email),
                password: Some(request.password),
            },
        )
        .await
    }

    pub async fn update(
        &self,
        actor: &PrincipalId,
        id: &PrincipalId,
        request: UpdateUserRequest,
    ) -> Result<UserProfile, ApplicationError> {
        ensure_self(actor, id)?;

        let mut changes = UserChanges {
            username: request.username.as_deref().map(validation::username).transpose()?,
            email: request.email.as_deref().map(validation::email).transpose()?,
            password_hash: None,
        };
        if let Some(password) = request.password.as_deref() {
            let password = validation::password(password)?;
            changes.password_hash = Some(self.deps.password_hasher.hash(password).await?);
        }

        if changes.is_empty() {
            return self.get(id).await;
        }

        let updated = self
            .deps
            .credentials
            .update(id, changes)
            .await
            .map_err(conflict_as_user_exists)?
            .ok_or(ApplicationError::UserNotFound)?;

        info!(user_id = %id, "user updated");
        Ok(UserProfile::from(&updated))
    }

    /// 软删除用户，同时吊销其刷新令牌
    pub async fn delete(&self, actor: &PrincipalId, id: &PrincipalId) -> Result<(), ApplicationError> {
        ensure_self(actor, id)?;

        // 先吊销，吊销失败时用户保持不变
        self.deps.tokens.invalidate(id).await?;

        if !self.deps.credentials.soft_delete(id).await? {
            return Err(ApplicationError::UserNotFound);
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }
}

fn ensure_self(actor: &PrincipalId, id: &PrincipalId) -> Result<(), ApplicationError> {
    if actor == id {
        Ok(())
    } else {
        Err(ApplicationError::Forbidden)
    }
}

fn conflict_as_user_exists(err: StorageError) -> ApplicationError {
    match err {
        StorageError::Conflict => ApplicationError::UserAlreadyExists,
        other => ApplicationError::Storage(other),
    }
}
