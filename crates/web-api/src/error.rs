use application::ApplicationError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{AuthError, StorageError};
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    /// 所有令牌校验失败共用的响应，不区分过期、无效和已吊销
    pub fn token_rejected() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "invalid or expired token",
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal_server_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal server error",
        )
    }

    pub fn service_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "service temporarily unavailable",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.body.code
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired
            | AuthError::TokenInvalid
            | AuthError::TokenRevoked
            | AuthError::ConnectionRejected => ApiError::token_rejected(),
            AuthError::AuthenticationFailed => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "invalid credentials",
            ),
            AuthError::StorageUnavailable(message) => {
                error!(error = %message, "storage unavailable");
                ApiError::service_unavailable()
            }
            AuthError::Internal(message) => {
                error!(error = %message, "internal auth error");
                ApiError::internal_server_error()
            }
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        match error {
            AppErr::Auth(err) => ApiError::from(err),
            AppErr::InvalidArgument { field, reason } => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::UserAlreadyExists => {
                ApiError::new(StatusCode::CONFLICT, "USER_EXISTS", "user already exists")
            }
            AppErr::UserNotFound => {
                ApiError::new(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "user not found")
            }
            AppErr::Forbidden => {
                ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", "operation not permitted")
            }
            AppErr::Storage(StorageError::Conflict) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
            }
            AppErr::Storage(StorageError::Unavailable(message)) => {
                error!(error = %message, "storage unavailable");
                ApiError::service_unavailable()
            }
            AppErr::Password(err) => {
                error!(error = %err, "password hashing failed");
                ApiError::internal_server_error()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(error = %rejection.body_text(), "request body rejected");
        ApiError::new(rejection.status(), "INVALID_BODY", "invalid request body")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        debug!(error = %rejection.body_text(), "query string rejected");
        ApiError::new(StatusCode::BAD_REQUEST, "INVALID_QUERY", "invalid query parameters")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
