use anyhow::Result;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::domain::{Provider, UserId};
use crate::entities::users;

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("a user with this identity already exists")]
    DuplicateIdentity,

    #[error("user not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(#[from] DbErr),
}

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub secret: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: UserId::new(model.id),
            username: model.username,
            google_id: model.google_id,
            facebook_id: model.facebook_id,
            secret: model.secret,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Attributes for a new user. Every variant carries exactly one identity
/// method, so a record can never be created without one.
#[derive(Debug, Clone)]
pub enum NewUser {
    Local {
        username: String,
        password_hash: String,
    },
    External {
        provider: Provider,
        subject: String,
    },
}

const fn provider_column(provider: Provider) -> users::Column {
    match provider {
        Provider::Google => users::Column::GoogleId,
        Provider::Facebook => users::Column::FacebookId,
    }
}

fn classify(err: DbErr) -> UserStoreError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        UserStoreError::DuplicateIdentity
    } else {
        UserStoreError::Unavailable(err)
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert a user. Uniqueness of username and provider subject ids is left
    /// to the database's unique indexes.
    pub async fn create(&self, new_user: NewUser) -> Result<User, UserStoreError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut active = users::ActiveModel {
            created_at: Set(now.clone()),
            updated_at: Set(now),
            ..Default::default()
        };

        match new_user {
            NewUser::Local {
                username,
                password_hash,
            } => {
                active.username = Set(Some(username));
                active.password_hash = Set(Some(password_hash));
            }
            NewUser::External { provider, subject } => match provider {
                Provider::Google => active.google_id = Set(Some(subject)),
                Provider::Facebook => active.facebook_id = Set(Some(subject)),
            },
        }

        let model = active.insert(&self.conn).await.map_err(classify)?;
        Ok(User::from(model))
    }

    pub async fn find_by_id(&self, id: UserId) -> Result<User, UserStoreError> {
        users::Entity::find_by_id(id.value())
            .one(&self.conn)
            .await?
            .map(User::from)
            .ok_or(UserStoreError::NotFound)
    }

    /// Get user by username together with its password hash, if it has one.
    pub async fn find_by_username_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(User, Option<String>)>, UserStoreError> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    pub async fn find_by_external_id(
        &self,
        provider: Provider,
        subject: &str,
    ) -> Result<User, UserStoreError> {
        users::Entity::find()
            .filter(provider_column(provider).eq(subject))
            .one(&self.conn)
            .await?
            .map(User::from)
            .ok_or(UserStoreError::NotFound)
    }

    /// Every user that has posted a secret, most recently updated first.
    pub async fn find_with_secrets(&self) -> Result<Vec<User>, UserStoreError> {
        let rows = users::Entity::find()
            .filter(users::Column::Secret.is_not_null())
            .order_by_desc(users::Column::UpdatedAt)
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Replace the user's secret in a single-row update.
    pub async fn update_secret(&self, id: UserId, text: &str) -> Result<(), UserStoreError> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = users::Entity::update_many()
            .col_expr(users::Column::Secret, Expr::value(text.to_string()))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id.value()))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(UserStoreError::NotFound);
        }

        Ok(())
    }
}

fn argon2_for(config: &SecurityConfig) -> Result<Argon2<'static>> {
    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None,
    )
    .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with a fresh random salt.
/// CPU-bound: call from `spawn_blocking`.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = argon2_for(config)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Check a password against a stored PHC string. The parameters and salt
/// come from the hash itself, so older hashes keep verifying after a config
/// change. CPU-bound: call from `spawn_blocking`.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
