use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    ChatMessage, CredentialStore, MessageStore, NewUser, PrincipalId, StorageError, UserChanges,
    UserCredential,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> StorageError {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StorageError::Conflict,
        other => StorageError::unavailable(other.to_string()),
    }
}

/// 主体标识即 users.id 的十进制表示
fn parse_subject(subject: &PrincipalId) -> Option<i64> {
    subject.as_str().parse().ok()
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
}

impl From<UserRecord> for UserCredential {
    fn from(value: UserRecord) -> Self {
        UserCredential {
            subject: PrincipalId::new(value.id.to_string()),
            username: value.username,
            email: value.email,
            password_hash: value.password_hash,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    username: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for ChatMessage {
    fn from(value: MessageRecord) -> Self {
        ChatMessage::new(value.username, value.content, value.created_at)
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredential>, StorageError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash
            FROM users
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(UserCredential::from))
    }

    async fn find_by_subject(
        &self,
        subject: &PrincipalId,
    ) -> Result<Option<UserCredential>, StorageError> {
        let Some(id) = parse_subject(subject) else {
            return Ok(None);
        };

        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash
            FROM users
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(UserCredential::from))
    }

    async fn create(&self, user: NewUser) -> Result<UserCredential, StorageError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(UserCredential::from(record))
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<UserCredential>, StorageError> {
        let records = sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, username, email, password_hash
            FROM users
            WHERE deleted_at IS NULL
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(UserCredential::from).collect())
    }

    async fn update(
        &self,
        subject: &PrincipalId,
        changes: UserChanges,
    ) -> Result<Option<UserCredential>, StorageError> {
        let Some(id) = parse_subject(subject) else {
            return Ok(None);
        };

        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, username, email, password_hash
            "#,
        )
        .bind(id)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(UserCredential::from))
    }

    async fn soft_delete(&self, subject: &PrincipalId) -> Result<bool, StorageError> {
        let Some(id) = parse_subject(subject) else {
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            UPDATE users
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, sender: &PrincipalId, message: &ChatMessage) -> Result<(), StorageError> {
        let sender_id = parse_subject(sender)
            .ok_or_else(|| StorageError::unavailable(format!("invalid sender id: {sender}")))?;

        sqlx::query(
            r#"INSERT INTO messages (sender_id, content, created_at) VALUES ($1, $2, $3)"#,
        )
        .bind(sender_id)
        .bind(&message.content)
        .bind(message.time)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn list(&self, limit: u32, offset: u32) -> Result<Vec<ChatMessage>, StorageError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT u.username, m.content, m.created_at
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(ChatMessage::from).collect())
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
