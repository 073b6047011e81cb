//! 会话门卫
//!
//! 从请求中提取访问令牌并校验，成功后把主体写入请求扩展。
//! 提取顺序：`Authorization: Bearer`，然后是配置的 cookie，
//! 最后是查询参数 `token`（仅限实时连接升级路由）。

use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Uri},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use domain::{PrincipalId, TokenKind};
use serde::Deserialize;
use time::Duration;
use tracing::debug;

use crate::{error::ApiError, state::AppState};

/// 已通过门卫的主体
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub PrincipalId);

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedPrincipal>()
            .cloned()
            .ok_or_else(ApiError::token_rejected)
    }
}

pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, request, next, false).await
}

/// 实时连接升级路由专用：额外接受查询参数中的令牌
pub async fn require_upgrade_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    authorize(&state, request, next, true).await
}

async fn authorize(
    state: &AppState,
    mut request: Request,
    next: Next,
    allow_query: bool,
) -> Result<Response, ApiError> {
    let token = extract_token(
        request.headers(),
        request.uri(),
        &state.cookie_name,
        allow_query,
    )
    .ok_or_else(|| {
        debug!(path = %request.uri().path(), "request without credentials");
        ApiError::token_rejected()
    })?;

    let claims = state
        .auth_service
        .tokens()
        .validate_token(&token, TokenKind::Access)
        .map_err(|err| {
            debug!(path = %request.uri().path(), error = %err, "session rejected");
            ApiError::token_rejected()
        })?;

    request
        .extensions_mut()
        .insert(AuthenticatedPrincipal(claims.sub));
    Ok(next.run(request).await)
}

fn extract_token(
    headers: &HeaderMap,
    uri: &Uri,
    cookie_name: &str,
    allow_query: bool,
) -> Option<String> {
    bearer_token(headers)
        .or_else(|| cookie_token(headers, cookie_name))
        .or_else(|| if allow_query { query_token(uri) } else { None })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

fn cookie_token(headers: &HeaderMap, name: &str) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(name)
        .map(|cookie| cookie.value_trimmed())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri)
        .ok()?
        .0
        .token
        .filter(|token| !token.is_empty())
}

/// 携带访问令牌的 HttpOnly cookie
pub fn session_cookie(name: &str, token: &str, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build((name.to_owned(), token.to_owned()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(max_age_seconds))
        .build()
}

pub fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_owned(), String::new()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}
