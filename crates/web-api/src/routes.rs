use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{
        header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ORIGIN},
        HeaderValue, Method, StatusCode,
    },
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use application::{
    CreateUserRequest, LoginRequest, RegisterUserRequest, ReplaceUserRequest, UpdateUserRequest,
};
use domain::{ChatMessage, PrincipalId, TokenPair, UserProfile};

use crate::{
    auth::{
        clear_session_cookie, require_session, require_upgrade_session, session_cookie,
        AuthenticatedPrincipal,
    },
    error::ApiError,
    extract::{ApiJson, ApiQuery},
    state::AppState,
    websocket::websocket_upgrade,
};

#[derive(Debug, Deserialize)]
struct UserPayload {
    username: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UserPatchPayload {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    user: UserProfile,
    #[serde(flatten)]
    tokens: TokenPair,
}

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes(state.clone()))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/auth/register", post(register_user))
        .route("/auth/login", post(login_user))
        .route("/auth/refresh", post(refresh_tokens));

    let protected = Router::new()
        .route("/auth/logout", post(logout_user))
        .route("/me", get(current_user))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user)
                .put(replace_user)
                .patch(update_user)
                .delete(delete_user),
        )
        .route("/chat/messages", get(message_history))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let realtime = Router::new()
        .route("/chat/ws", get(websocket_upgrade))
        .route_layer(middleware::from_fn_with_state(
            state,
            require_upgrade_session,
        ));

    public.merge(protected).merge(realtime)
}

/// 跨域策略；`*` 放开所有来源但不允许携带凭据
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ORIGIN, CONTENT_TYPE, AUTHORIZATION])
        .expose_headers([CONTENT_LENGTH])
        .max_age(Duration::from_secs(86_400));

    if origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring invalid cors origin");
                None
            }
        })
        .collect();
    layer
        .allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn register_user(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<UserPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let registered = state
        .auth_service
        .register(RegisterUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let jar = jar.add(session_cookie(
        &state.cookie_name,
        &registered.tokens.access_token,
        registered.tokens.expires_in,
    ));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(RegisterResponse {
            user: registered.user,
            tokens: registered.tokens,
        }),
    ))
}

async fn login_user(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<LoginPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .auth_service
        .login(LoginRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let jar = jar.add(session_cookie(
        &state.cookie_name,
        &pair.access_token,
        pair.expires_in,
    ));
    Ok((jar, Json(pair)))
}

async fn refresh_tokens(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(payload): ApiJson<RefreshPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.refresh_token.trim().is_empty() {
        return Err(ApiError::bad_request("refresh_token is required"));
    }

    let pair = state.auth_service.refresh(&payload.refresh_token).await?;
    let jar = jar.add(session_cookie(
        &state.cookie_name,
        &pair.access_token,
        pair.expires_in,
    ));
    Ok((jar, Json(pair)))
}

async fn logout_user(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state.auth_service.logout(&principal).await?;
    Ok((
        StatusCode::NO_CONTENT,
        jar.add(clear_session_cookie(&state.cookie_name)),
    ))
}

async fn current_user(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> Result<Json<UserProfile>, ApiError> {
    let profile = state.auth_service.profile(&principal).await?;
    Ok(Json(profile))
}

async fn list_users(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let users = state.user_service.list(query.limit, query.offset).await?;
    Ok(Json(users))
}

async fn create_user(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UserPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .create(CreateUserRequest {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state.user_service.get(&PrincipalId::from(id)).await?;
    Ok(Json(user))
}

async fn replace_user(
    State(state): State<AppState>,
    AuthenticatedPrincipal(actor): AuthenticatedPrincipal,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UserPayload>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .user_service
        .replace(
            &actor,
            &PrincipalId::from(id),
            ReplaceUserRequest {
                username: payload.username,
                email: payload.email,
                password: payload.password,
            },
        )
        .await?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    AuthenticatedPrincipal(actor): AuthenticatedPrincipal,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UserPatchPayload>,
) -> Result<Json<UserProfile>, ApiError> {
    let user = state
        .user_service
        .update(
            &actor,
            &PrincipalId::from(id),
            UpdateUserRequest {
                username: payload.username,
                email: payload.email,
                password: payload.password,
            },
        )
        .await?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedPrincipal(actor): AuthenticatedPrincipal,
    Path(id): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state
        .user_service
        .delete(&actor, &PrincipalId::from(id))
        .await?;
    // 只能删除自己，会话随之结束
    Ok((
        StatusCode::NO_CONTENT,
        jar.add(clear_session_cookie(&state.cookie_name)),
    ))
}

async fn message_history(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = state
        .chat_service
        .history(query.limit, query.offset)
        .await?;
    Ok(Json(messages))
}
