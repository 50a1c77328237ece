use anyhow::Context;
use axum::{Router, middleware, routing::get};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::auth::SessionBackend;
use crate::config::Config;
use crate::db::Store;
use crate::oauth::OAuthClients;
use crate::services::{AuthService, SeaOrmAuthService, SeaOrmSecretService, SecretService};

pub mod auth;
mod error;
mod observability;
mod pages;

pub use auth::CurrentUser;
pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub auth: Arc<dyn AuthService>,

    pub secrets: Arc<dyn SecretService>,

    pub oauth: Arc<OAuthClients>,

    pub sessions: SessionBackend,
}

/// Connect the store, run migrations and wire up the services.
pub async fn create_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_url,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await
    .context("Failed to open database")?;

    let auth = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        config.security.clone(),
    ));
    let secrets = Arc::new(SeaOrmSecretService::new(
        store.clone(),
        config.secrets.max_length,
    ));

    let oauth = Arc::new(
        OAuthClients::from_config(&config.oauth).context("Failed to configure OAuth providers")?,
    );

    let sessions = SessionBackend::from_config(&config, &store).await?;

    Ok(Arc::new(AppState {
        config,
        store,
        auth,
        secrets,
        oauth,
        sessions,
    }))
}

pub fn router(state: Arc<AppState>) -> anyhow::Result<Router> {
    let protected_routes = Router::new()
        .route("/submit", get(pages::submit_form).post(pages::submit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let app = Router::new()
        .route("/", get(pages::home))
        .route("/login", get(pages::login).post(auth::login))
        .route("/register", get(pages::register).post(auth::register))
        .route("/secrets", get(pages::secrets))
        .route("/logout", get(auth::logout))
        .route("/auth/{provider}", get(auth::begin_oauth))
        .route("/auth/{provider}/secrets", get(auth::oauth_callback))
        .route("/health", get(observability::health))
        .merge(protected_routes)
        .fallback_service(ServeDir::new(&state.config.general.public_path))
        .with_state(state.clone());

    let app = state.sessions.layer(app, &state.config)?;

    Ok(app
        .layer(middleware::from_fn(
            observability::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware)))
}
