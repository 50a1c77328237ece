use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::domain::{Provider, UserId};

pub mod migrator;
pub mod repositories;

pub use repositories::user::{NewUser, User, UserStoreError};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !is_in_memory(db_url) {
            let path_str = db_url
                .trim_start_matches("sqlite:")
                .trim_start_matches("//")
                .split('?')
                .next()
                .unwrap_or_default();
            if let Some(parent) = Path::new(path_str)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file {path_str}"))?;
            }
        }

        // Every pooled connection to `sqlite::memory:` would open its own empty
        // database, so the pool is pinned to a single connection.
        let (max_connections, min_connections) = if is_in_memory(db_url) {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(false);

        // In-memory databases vanish when their last connection closes.
        if !is_in_memory(db_url) {
            opt.max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    // ========== User Repository Methods ==========

    #[must_use]
    pub fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User, UserStoreError> {
        self.user_repo().create(new_user).await
    }

    pub async fn find_user(&self, id: UserId) -> Result<User, UserStoreError> {
        self.user_repo().find_by_id(id).await
    }

    pub async fn find_user_by_username_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(User, Option<String>)>, UserStoreError> {
        self.user_repo()
            .find_by_username_with_password(username)
            .await
    }

    pub async fn find_user_by_external_id(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<User, UserStoreError> {
        self.user_repo()
            .find_by_external_id(provider, subject)
            .await
    }

    pub async fn list_users_with_secrets(&self) -> Result<Vec<User>, UserStoreError> {
        self.user_repo().find_with_secrets().await
    }

    pub async fn update_user_secret(&self, id: UserId, text: &str) -> Result<(), UserStoreError> {
        self.user_repo().update_secret(id, text).await
    }
}

fn is_in_memory(db_url: &str) -> bool {
    db_url.contains(":memory:") || db_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::new("sqlite::memory:").await.unwrap()
    }

    fn local(username: &str) -> NewUser {
        NewUser::Local {
            username: username.to_string(),
            password_hash: "$argon2id$placeholder".to_string(),
        }
    }

    #[tokio::test]
    async fn unusable_database_directory_is_reported() {
        let blocker = std::env::temp_dir().join(format!("secretboard-{}", uuid::Uuid::new_v4()));
        std::fs::write(&blocker, b"not a directory").unwrap();
        let url = format!("sqlite://{}/nested/board.db?mode=rwc", blocker.display());

        let err = Store::new(&url).await.err().unwrap();
        std::fs::remove_file(&blocker).unwrap();

        assert!(
            format!("{err:#}").contains("Failed to create database directory"),
            "{err:#}"
        );
    }

    #[tokio::test]
    async fn create_assigns_distinct_ids_and_leaves_secret_unset() {
        let store = memory_store().await;

        let alice = store.create_user(local("alice")).await.unwrap();
        let bob = store.create_user(local("bob")).await.unwrap();

        assert_ne!(alice.id, bob.id);
        assert_eq!(alice.username.as_deref(), Some("alice"));
        assert!(alice.secret.is_none());
        assert_eq!(store.find_user(alice.id).await.unwrap(), alice);
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_and_original_untouched() {
        let store = memory_store().await;
        let original = store.create_user(local("alice")).await.unwrap();

        let err = store.create_user(local("alice")).await.unwrap_err();
        assert!(matches!(err, UserStoreError::DuplicateIdentity));

        assert_eq!(store.find_user(original.id).await.unwrap(), original);
    }

    #[tokio::test]
    async fn external_ids_are_unique_per_provider_only() {
        let store = memory_store().await;

        let google = store
            .create_user(NewUser::External {
                provider: Provider::Google,
                subject: "123".to_string(),
            })
            .await
            .unwrap();
        let facebook = store
            .create_user(NewUser::External {
                provider: Provider::Facebook,
                subject: "123".to_string(),
            })
            .await
            .unwrap();
        assert_ne!(google.id, facebook.id);

        let again = store
            .create_user(NewUser::External {
                provider: Provider::Google,
                subject: "123".to_string(),
            })
            .await;
        assert!(matches!(again, Err(UserStoreError::DuplicateIdentity)));

        let found = store
            .find_user_by_external_id(Provider::Google, "123")
            .await
            .unwrap();
        assert_eq!(found.id, google.id);
        assert!(matches!(
            store
                .find_user_by_external_id(Provider::Facebook, "999")
                .await,
            Err(UserStoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn several_external_users_without_username_coexist() {
        let store = memory_store().await;
        for subject in ["a", "b", "c"] {
            store
                .create_user(NewUser::External {
                    provider: Provider::Google,
                    subject: subject.to_string(),
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn update_secret_overwrites_and_lists_only_users_with_secrets() {
        let store = memory_store().await;
        let alice = store.create_user(local("alice")).await.unwrap();
        let bob = store.create_user(local("bob")).await.unwrap();

        store.update_user_secret(alice.id, "first").await.unwrap();
        store.update_user_secret(alice.id, "second").await.unwrap();

        let listed = store.list_users_with_secrets().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, alice.id);
        assert_eq!(listed[0].secret.as_deref(), Some("second"));

        assert!(store.find_user(bob.id).await.unwrap().secret.is_none());
    }

    #[tokio::test]
    async fn update_secret_for_missing_user_is_not_found() {
        let store = memory_store().await;
        let err = store
            .update_user_secret(UserId::new(404), "text")
            .await
            .unwrap_err();
        assert!(matches!(err, UserStoreError::NotFound));
    }

    #[tokio::test]
    async fn ping_succeeds() {
        memory_store().await.ping().await.unwrap();
    }
}
