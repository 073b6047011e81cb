pub mod password_service;

pub use password_service::PasswordHasher;

#[cfg(feature = "testing")]
pub use password_service::MockPasswordHasher;
