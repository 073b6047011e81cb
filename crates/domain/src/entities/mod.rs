pub mod auth;
pub mod message;

pub use auth::{
    Claims, NewUser, PrincipalId, TokenKind, TokenPair, UserChanges, UserCredential,
    UserProfile,
};
pub use message::{ChatMessage, InboundFrame};
