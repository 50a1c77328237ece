//! `SeaORM` implementation of the `SecretService` trait.

use async_trait::async_trait;
use tracing::info;

use crate::db::Store;
use crate::domain::UserId;
use crate::services::secret_service::{SecretEntry, SecretError, SecretService};
use crate::services::validation::validate_secret;

pub struct SeaOrmSecretService {
    store: Store,
    max_length: usize,
}

impl SeaOrmSecretService {
    #[must_use]
    pub const fn new(store: Store, max_length: usize) -> Self {
        Self { store, max_length }
    }
}

#[async_trait]
impl SecretService for SeaOrmSecretService {
    async fn list(&self) -> Result<Vec<SecretEntry>, SecretError> {
        let users = self.store.list_users_with_secrets().await?;

        Ok(users
            .into_iter()
            .filter_map(|user| {
                user.secret.map(|text| SecretEntry {
                    user_id: user.id,
                    text,
                })
            })
            .collect())
    }

    async fn submit(&self, user_id: UserId, text: &str) -> Result<(), SecretError> {
        let text = validate_secret(text, self.max_length).map_err(SecretError::Validation)?;

        self.store.update_user_secret(user_id, text).await?;

        info!(user_id = %user_id, "Secret updated");
        Ok(())
    }
}
