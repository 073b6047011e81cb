use crate::error::ApplicationError;

const MAX_USERNAME_CHARS: usize = 50;

pub(crate) fn username(raw: &str) -> Result<String, ApplicationError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(ApplicationError::invalid_argument(
            "username",
            "must not be empty",
        ));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(ApplicationError::invalid_argument(
            "username",
            format!("must be at most {MAX_USERNAME_CHARS} characters"),
        ));
    }
    Ok(username.to_string())
}

pub(crate) fn email(raw: &str) -> Result<String, ApplicationError> {
    let email = raw.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ApplicationError::invalid_argument(
            "email",
            "must be a valid address",
        ));
    }
    Ok(email.to_string())
}

pub(crate) fn password(raw: &str) -> Result<&str, ApplicationError> {
    if raw.is_empty() {
        return Err(ApplicationError::invalid_argument(
            "password",
            "must not be empty",
        ));
    }
    Ok(raw)
}
