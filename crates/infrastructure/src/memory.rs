//! 内存存储实现（用于测试和单机开发）

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use domain::{
    ChatMessage, CredentialStore, MessageStore, NewUser, PrincipalId, StorageError, UserChanges,
    UserCredential,
};
use tokio::sync::RwLock;

struct StoredUser {
    credential: UserCredential,
    deleted: bool,
}

/// 内存凭证存储，主体标识从 1 开始递增
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<Vec<StoredUser>>,
    next_id: AtomicU64,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, StorageError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|user| !user.deleted && user.credential.email == email)
            .map(|user| user.credential.clone()))
    }

    async fn find_by_subject(
        &self,
        subject: &PrincipalId,
    ) -> Result<Option<UserCredential>, StorageError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .find(|user| !user.deleted && &user.credential.subject == subject)
            .map(|user| user.credential.clone()))
    }

    async fn create(&self, user: NewUser) -> Result<UserCredential, StorageError> {
        let mut users = self.users.write().await;
        if users.iter().any(|existing| existing.credential.email == user.email) {
            return Err(StorageError::Conflict);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let credential = UserCredential {
            subject: PrincipalId::new(id.to_string()),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
        };
        users.push(StoredUser {
            credential: credential.clone(),
            deleted: false,
        });
        Ok(credential)
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<UserCredential>, StorageError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .filter(|user| !user.deleted)
            .skip(offset as usize)
            .take(limit as usize)
            .map(|user| user.credential.clone())
            .collect())
    }

    async fn update(
        &self,
        subject: &PrincipalId,
        changes: UserChanges,
    ) -> Result<Option<UserCredential>, StorageError> {
        let mut users = self.users.write().await;

        if let Some(email) = &changes.email {
            let taken = users
                .iter()
                .any(|user| &user.credential.email == email && &user.credential.subject != subject);
            if taken {
                return Err(StorageError::Conflict);
            }
        }

        let Some(user) = users
            .iter_mut()
            .find(|user| !user.deleted && &user.credential.subject == subject)
        else {
            return Ok(None);
        };

        if let Some(username) = changes.username {
            user.credential.username = username;
        }
        if let Some(email) = changes.email {
            user.credential.email = email;
        }
        if let Some(password_hash) = changes.password_hash {
            user.credential.password_hash = password_hash;
        }
        Ok(Some(user.credential.clone()))
    }

    async fn soft_delete(&self, subject: &PrincipalId) -> Result<bool, StorageError> {
        let mut users = self.users.write().await;
        match users
            .iter_mut()
            .find(|user| !user.deleted && &user.credential.subject == subject)
        {
            Some(user) => {
                user.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<(PrincipalId, ChatMessage)>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按写入顺序返回所有消息及其发送者
    pub async fn entries(&self) -> Vec<(PrincipalId, ChatMessage)> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, sender: &PrincipalId, message: &ChatMessage) -> Result<(), StorageError> {
        self.messages
            .write()
            .await
            .push((sender.clone(), message.clone()));
        Ok(())
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, StorageError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(_, message)| message.clone())
            .collect())
    }
}
