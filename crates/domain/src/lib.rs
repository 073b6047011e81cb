//! 会话认证与实时消息的核心领域模型
//!
//! 包含主体、令牌声明、聊天消息等实体，以及外部协作者（凭证存储、
//! 吊销存储、消息存储、密码校验器）的接口。

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod services;

// 重新导出常用类型
pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use services::*;
