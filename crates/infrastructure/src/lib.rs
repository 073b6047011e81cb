//! 基础设施层实现。
//!
//! 提供数据库存储、Redis 吊销存储与历史消息缓存、密码哈希等适配器，实现领域层定义的接口。

pub mod cache;
pub mod memory;
pub mod migrations;
pub mod password;
pub mod repository;
pub mod revocation;

pub use cache::{InMemoryHistoryCache, RedisHistoryCache};
pub use memory::{InMemoryCredentialStore, InMemoryMessageStore};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{create_pg_pool, PgCredentialStore, PgMessageStore};
pub use revocation::{InMemoryRevocationStore, RedisRevocationStore};
