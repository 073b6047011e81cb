//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务。

mod auth;
mod error;
mod extract;
mod routes;
mod state;
mod websocket;

pub use auth::{require_session, require_upgrade_session, AuthenticatedPrincipal};
pub use error::{ApiError, ErrorBody};
pub use extract::{ApiJson, ApiQuery};
pub use routes::router;
pub use state::AppState;
pub use websocket::{WsFrameSink, WsFrameSource};
