//! Domain service for the shared secrets board.

use serde::Serialize;
use thiserror::Error;

use crate::db::UserStoreError;
use crate::domain::UserId;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("User not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<UserStoreError> for SecretError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::NotFound => Self::NotFound,
            UserStoreError::DuplicateIdentity => {
                Self::StoreUnavailable("unexpected uniqueness conflict".to_string())
            }
            UserStoreError::Unavailable(e) => Self::StoreUnavailable(e.to_string()),
        }
    }
}

/// One posted secret. Only the author's id travels with the text; the board
/// never shows who wrote what.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretEntry {
    pub user_id: UserId,
    pub text: String,
}

#[async_trait::async_trait]
pub trait SecretService: Send + Sync {
    /// Every secret currently set, most recent first.
    async fn list(&self) -> Result<Vec<SecretEntry>, SecretError>;

    /// Replaces the user's secret with `text`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::Validation`] if the text is blank or too long.
    async fn submit(&self, user_id: UserId, text: &str) -> Result<(), SecretError>;
}
