//! Domain service for local credentials and external identity linking.

use thiserror::Error;

use crate::db::{User, UserStoreError};
use crate::domain::{Provider, UserId};
use crate::oauth::OAuthError;

/// Errors specific to authentication operations.
///
/// None of the messages name the account involved, so they can be logged
/// without leaking which usernames exist.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Identity already registered")]
    DuplicateIdentity,

    #[error("User not found")]
    NotFound,

    #[error("External provider failure: {0}")]
    UpstreamAuthFailure(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UserStoreError> for AuthError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::DuplicateIdentity => Self::DuplicateIdentity,
            UserStoreError::NotFound => Self::NotFound,
            UserStoreError::Unavailable(e) => Self::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<OAuthError> for AuthError {
    fn from(err: OAuthError) -> Self {
        Self::UpstreamAuthFailure(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for AuthError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Session(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Creates a local user with a freshly salted Argon2id hash.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateIdentity`] if the username is taken and
    /// [`AuthError::Validation`] for malformed input.
    async fn register(&self, username: &str, password: &str) -> Result<User, AuthError>;

    /// Checks a username/password pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown user, a wrong
    /// password, or an account without a local password alike.
    async fn verify(&self, username: &str, password: &str) -> Result<User, AuthError>;

    /// Resolves a provider subject id to a local user, creating one on first
    /// sight. Concurrent calls for the same subject yield the same user.
    async fn find_or_create_external(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<User, AuthError>;

    /// Loads the user a session points at.
    async fn current_user(&self, id: UserId) -> Result<User, AuthError>;
}
