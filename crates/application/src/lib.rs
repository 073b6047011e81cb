//! 应用层实现。
//!
//! 这里提供会话认证和实时消息的用例服务：令牌签发与轮换、
//! 凭证校验、用户管理、带缓存的历史消息、连接中心以及每个连接的代理。

pub mod agent;
pub mod clock;
pub mod error;
pub mod hub;
pub mod services;
pub mod transport;

pub use agent::ConnectionAgent;
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use hub::{BroadcastReport, ConnectionHub, ConnectionId, HubError, OutboundFrame};
pub use services::{
    AuthService, AuthServiceDependencies, CachedMessageStore, ChatService, CreateUserRequest,
    LoginRequest, RegisterUserRequest, RegisteredUser, ReplaceUserRequest, TokenService,
    UpdateUserRequest, UserService, UserServiceDependencies,
};
pub use transport::{FrameSink, FrameSource, TransportError};
