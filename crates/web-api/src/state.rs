use std::sync::Arc;

use application::{AuthService, ChatService, UserService};

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub chat_service: Arc<ChatService>,
    /// 携带访问令牌的 cookie 名
    pub cookie_name: Arc<str>,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        user_service: Arc<UserService>,
        chat_service: Arc<ChatService>,
        cookie_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            auth_service,
            user_service,
            chat_service,
            cookie_name: cookie_name.into(),
        }
    }
}
