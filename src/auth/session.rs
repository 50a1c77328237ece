//! Server-side sessions.
//!
//! The browser only ever holds a signed, random session id. Everything else
//! (the authenticated user, a pending OAuth authorization) lives in the
//! session store and is reached through the functions below; handlers never
//! touch session keys directly.

use anyhow::Context;
use argon2::Argon2;
use axum::Router;
use time::Duration;
use tokio::task::JoinHandle;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::session::Id;
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{error, info};

use crate::config::{Config, SessionStoreKind};
use crate::db::Store;
use crate::domain::UserId;
use crate::oauth::PendingAuthorization;
use crate::services::AuthError;

const USER_ID_KEY: &str = "user_id";
const OAUTH_PENDING_KEY: &str = "oauth_pending";
const KEY_DERIVATION_SALT: &[u8] = b"secretboard.session-cookie-key";

/// Who the current request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Anonymous,
    Authenticated(UserId),
}

impl Identity {
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(id) => Some(*id),
        }
    }
}

/// Bind the session to `user_id` under a fresh id and return that id.
///
/// Cycling the id means a token planted before login never becomes an
/// authenticated one.
pub async fn establish(session: &Session, user_id: UserId) -> Result<Id, AuthError> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user_id).await?;
    session.save().await?;

    session
        .id()
        .ok_or_else(|| AuthError::Session("session id missing after save".to_string()))
}

/// Resolve the session to an identity. Unknown, expired or empty sessions
/// are all anonymous.
pub async fn resolve(session: &Session) -> Result<Identity, AuthError> {
    Ok(session
        .get::<UserId>(USER_ID_KEY)
        .await?
        .map_or(Identity::Anonymous, Identity::Authenticated))
}

/// Drop the session record and its cookie. Destroying an absent session is
/// not an error.
pub async fn destroy(session: &Session) -> Result<(), AuthError> {
    session.flush().await?;
    Ok(())
}

pub async fn stash_oauth_pending(
    session: &Session,
    pending: &PendingAuthorization,
) -> Result<(), AuthError> {
    session.insert(OAUTH_PENDING_KEY, pending).await?;
    Ok(())
}

/// Remove and return the pending authorization so a state value can be
/// presented at most once.
pub async fn take_oauth_pending(
    session: &Session,
) -> Result<Option<PendingAuthorization>, AuthError> {
    Ok(session.remove(OAUTH_PENDING_KEY).await?)
}

/// Derive the 64-byte cookie signing key from the configured secret.
pub fn derive_cookie_key(secret: &str) -> anyhow::Result<Key> {
    let mut material = [0u8; 64];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), KEY_DERIVATION_SALT, &mut material)
        .map_err(|e| anyhow::anyhow!("Failed to derive session key: {e}"))?;
    Ok(Key::from(&material))
}

/// The session store selected by `session.store`.
#[derive(Clone)]
pub enum SessionBackend {
    Memory(MemoryStore),
    Database(SqliteStore),
}

impl SessionBackend {
    pub async fn from_config(config: &Config, store: &Store) -> anyhow::Result<Self> {
        match config.session.store {
            SessionStoreKind::Memory => Ok(Self::Memory(MemoryStore::default())),
            SessionStoreKind::Database => {
                let sessions = SqliteStore::new(store.conn.get_sqlite_connection_pool().clone());
                sessions
                    .migrate()
                    .await
                    .context("Failed to migrate session table")?;
                Ok(Self::Database(sessions))
            }
        }
    }

    /// Wrap `router` in a session layer backed by this store.
    pub fn layer<S>(&self, router: Router<S>, config: &Config) -> anyhow::Result<Router<S>>
    where
        S: Clone + Send + Sync + 'static,
    {
        let key = derive_cookie_key(&config.session.secret)?;

        let router = match self {
            Self::Memory(store) => router.layer(configure(
                SessionManagerLayer::new(store.clone()),
                config,
                key,
            )),
            Self::Database(store) => router.layer(configure(
                SessionManagerLayer::new(store.clone()),
                config,
                key,
            )),
        };

        Ok(router)
    }

    /// Periodically purge expired rows. Memory sessions expire lazily on
    /// load and need no task.
    pub fn spawn_expired_cleanup(&self, interval_seconds: u64) -> Option<JoinHandle<()>> {
        match self {
            Self::Memory(_) => None,
            Self::Database(store) => {
                let store = store.clone();
                info!(interval_seconds, "Starting expired session cleanup");
                Some(tokio::spawn(async move {
                    if let Err(e) = store
                        .continuously_delete_expired(tokio::time::Duration::from_secs(
                            interval_seconds,
                        ))
                        .await
                    {
                        error!("Expired session cleanup stopped: {e}");
                    }
                }))
            }
        }
    }
}

fn configure<T>(
    layer: SessionManagerLayer<T>,
    config: &Config,
    key: Key,
) -> SessionManagerLayer<T, tower_sessions::service::SignedCookie>
where
    T: tower_sessions::SessionStore,
{
    layer
        .with_name(config.session.cookie_name.clone())
        .with_secure(config.server.secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(
            config.session.ttl_minutes,
        )))
        .with_signed(key)
}
