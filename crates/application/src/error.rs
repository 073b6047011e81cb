use domain::{AuthError, PasswordHasherError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("user not found")]
    UserNotFound,
    #[error("operation not permitted")]
    Forbidden,
}

impl ApplicationError {
    pub fn invalid_argument(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field,
            reason: reason.into(),
        }
    }
}
