//! Repository接口定义
//!
//! 定义外部协作者的抽象接口，内层定义接口，外层实现接口。

pub mod history_cache;
pub mod message_repository;
pub mod revocation_store;
pub mod user_repository;

pub use history_cache::HistoryCache;
pub use message_repository::MessageStore;
pub use revocation_store::RevocationStore;
pub use user_repository::CredentialStore;

#[cfg(feature = "testing")]
pub use history_cache::MockHistoryCache;
#[cfg(feature = "testing")]
pub use message_repository::MockMessageStore;
#[cfg(feature = "testing")]
pub use revocation_store::MockRevocationStore;
#[cfg(feature = "testing")]
pub use user_repository::MockCredentialStore;
