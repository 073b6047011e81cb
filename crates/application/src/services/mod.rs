mod auth_service;
mod cached_messages;
mod chat_service;
mod token_service;
mod user_service;
mod validation;

pub use auth_service::{
    AuthService, AuthServiceDependencies, LoginRequest, RegisterUserRequest, RegisteredUser,
};
pub use cached_messages::CachedMessageStore;
pub use chat_service::ChatService;
pub use token_service::TokenService;
pub use user_service::{
    CreateUserRequest, ReplaceUserRequest, UpdateUserRequest, UserService,
    UserServiceDependencies,
};
