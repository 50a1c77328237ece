//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::task;
use tracing::{info, warn};

use crate::config::SecurityConfig;
use crate::db::repositories::user::{hash_password, verify_password};
use crate::db::{NewUser, Store, User, UserStoreError};
use crate::domain::{Provider, UserId};
use crate::services::auth_service::{AuthError, AuthService};
use crate::services::validation::{validate_password, validate_username};

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
    /// Hash checked when the account has no password, so a miss costs the
    /// same Argon2 work as a wrong password.
    dummy_hash: OnceCell<String>,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self {
            store,
            security,
            dummy_hash: OnceCell::const_new(),
        }
    }

    async fn dummy_hash(&self) -> Result<String, AuthError> {
        let hash = self
            .dummy_hash
            .get_or_try_init(|| async {
                let security = self.security.clone();
                task::spawn_blocking(move || hash_password("secretboard-dummy", &security))
                    .await
                    .map_err(|e| {
                        AuthError::Internal(format!("Password hashing task panicked: {e}"))
                    })?
                    .map_err(AuthError::from)
            })
            .await?;
        Ok(hash.clone())
    }
}

fn record_attempt(method: &'static str, outcome: &'static str) {
    metrics::counter!("auth_attempts_total", "method" => method, "outcome" => outcome)
        .increment(1);
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = validate_username(username).map_err(AuthError::Validation)?;
        let password = validate_password(password).map_err(AuthError::Validation)?;

        let password = password.to_string();
        let security = self.security.clone();
        // Argon2 is CPU-bound; keep it off the async workers.
        let password_hash = task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task panicked: {e}")))??;

        let result = self
            .store
            .create_user(NewUser::Local {
                username: username.to_string(),
                password_hash,
            })
            .await;

        match result {
            Ok(user) => {
                record_attempt("register", "success");
                info!(user_id = %user.id, "Registered local user");
                Ok(user)
            }
            Err(e) => {
                record_attempt("register", "failure");
                Err(e.into())
            }
        }
    }

    async fn verify(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let (Ok(username), Ok(password)) = (validate_username(username), validate_password(password))
        else {
            record_attempt("local", "failure");
            return Err(AuthError::InvalidCredentials);
        };

        let (user, password_hash) = match self
            .store
            .find_user_by_username_with_password(username)
            .await?
        {
            Some((user, Some(password_hash))) => (Some(user), password_hash),
            _ => (None, self.dummy_hash().await?),
        };

        let password = password.to_string();
        let is_valid = task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .map_err(|e| {
                AuthError::Internal(format!("Password verification task panicked: {e}"))
            })??;

        let Some(user) = user.filter(|_| is_valid) else {
            record_attempt("local", "failure");
            return Err(AuthError::InvalidCredentials);
        };

        record_attempt("local", "success");
        info!(user_id = %user.id, "Local login verified");
        Ok(user)
    }

    async fn find_or_create_external(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<User, AuthError> {
        let subject = subject.trim();
        if subject.is_empty() {
            record_attempt(provider.slug(), "failure");
            return Err(AuthError::UpstreamAuthFailure(format!(
                "{} returned an empty subject id",
                provider.display_name()
            )));
        }

        match self.store.find_user_by_external_id(provider, subject).await {
            Ok(user) => {
                record_attempt(provider.slug(), "success");
                return Ok(user);
            }
            Err(UserStoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let created = self
            .store
            .create_user(NewUser::External {
                provider,
                subject: subject.to_string(),
            })
            .await;

        let user = match created {
            Ok(user) => {
                info!(user_id = %user.id, %provider, "Linked new external identity");
                user
            }
            // Another callback for the same subject committed first.
            Err(UserStoreError::DuplicateIdentity) => {
                warn!(%provider, "Concurrent link detected, reusing existing user");
                self.store
                    .find_user_by_external_id(provider, subject)
                    .await
                    .map_err(|e| match e {
                        UserStoreError::NotFound => AuthError::Internal(
                            "External identity vanished after a uniqueness conflict".to_string(),
                        ),
                        other => other.into(),
                    })?
            }
            Err(e) => return Err(e.into()),
        };

        record_attempt(provider.slug(), "success");
        Ok(user)
    }

    async fn current_user(&self, id: UserId) -> Result<User, AuthError> {
        Ok(self.store.find_user(id).await?)
    }
}
