use axum::{
    Extension, Form,
    extract::{Path, Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::auth::gate::{self, Access, LOGIN_ROUTE, RoutePolicy};
use crate::auth::session;
use crate::domain::{Provider, UserId};
use crate::oauth::CallbackParams;
use crate::services::AuthError;

const SECRETS_ROUTE: &str = "/secrets";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// The authenticated user, inserted by [`require_auth`].
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub UserId);

// ============================================================================
// Middleware
// ============================================================================

/// Gate for routes that need a signed-in user. Anonymous visitors, and
/// sessions whose user no longer exists, are redirected to the login page
/// before the handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = session::resolve(&session).await?;

    let user_id = match gate::authorize(&identity, RoutePolicy::RequiresAuthentication) {
        Access::Deny { redirect_to } => return Ok(Redirect::to(redirect_to).into_response()),
        Access::Allow => identity.user_id(),
    };

    if let Some(user_id) = user_id {
        match state.auth.current_user(user_id).await {
            Ok(_) => {}
            Err(AuthError::NotFound) => {
                warn!(user_id = %user_id, "Session refers to a missing user");
                session::destroy(&session).await?;
                return Ok(Redirect::to(LOGIN_ROUTE).into_response());
            }
            Err(e) => return Err(e.into()),
        }

        tracing::Span::current().record("user_id", user_id.value());
        request.extensions_mut().insert(CurrentUser(user_id));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// Local credentials
// ============================================================================

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Redirect, ApiError> {
    let user = state
        .auth
        .register(&form.username, &form.password)
        .await
        .map_err(|e| ApiError::auth(e, "/register"))?;

    session::establish(&session, user.id).await?;
    tracing::Span::current().record("user_id", user.id.value());

    Ok(Redirect::to(SECRETS_ROUTE))
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Redirect, ApiError> {
    let user = state
        .auth
        .verify(&form.username, &form.password)
        .await
        .map_err(|e| ApiError::auth(e, LOGIN_ROUTE))?;

    session::establish(&session, user.id).await?;
    tracing::Span::current().record("user_id", user.id.value());

    Ok(Redirect::to(SECRETS_ROUTE))
}

/// GET /logout
pub async fn logout(session: Session) -> Result<Redirect, ApiError> {
    if let Ok(Some(user_id)) = session::resolve(&session).await.map(|i| i.user_id()) {
        info!(user_id = %user_id, "User logged out");
    }
    session::destroy(&session).await?;
    Ok(Redirect::to("/"))
}

// ============================================================================
// External providers
// ============================================================================

fn parse_provider(slug: &str) -> Result<Provider, ApiError> {
    slug.parse().map_err(|_| ApiError::not_found("Page"))
}

/// GET /auth/{provider}
pub async fn begin_oauth(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(slug): Path<String>,
) -> Result<Redirect, ApiError> {
    let provider = parse_provider(&slug)?;

    let client = match state.oauth.get(provider) {
        Ok(client) => client,
        Err(e) => {
            warn!(%provider, "{e}");
            return Ok(Redirect::to(LOGIN_ROUTE));
        }
    };

    let (authorize_url, pending) = client.authorize_url();
    session::stash_oauth_pending(&session, &pending).await?;

    Ok(Redirect::to(authorize_url.as_str()))
}

/// GET /auth/{provider}/secrets
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(slug): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, ApiError> {
    let provider = parse_provider(&slug)?;

    // Taken before anything can fail so a state value is never usable twice.
    let pending = session::take_oauth_pending(&session).await?;

    let client = state.oauth.get(provider).map_err(|e| {
        warn!(%provider, "{e}");
        ApiError::Redirect(LOGIN_ROUTE)
    })?;

    let subject = client.complete(params, pending).await.map_err(|e| {
        metrics::counter!("auth_attempts_total", "method" => provider.slug(), "outcome" => "failure")
            .increment(1);
        ApiError::from(AuthError::from(e))
    })?;

    let user = state
        .auth
        .find_or_create_external(provider, &subject)
        .await
        .map_err(|e| ApiError::auth(e, LOGIN_ROUTE))?;

    session::establish(&session, user.id).await?;
    tracing::Span::current().record("user_id", user.id.value());

    Ok(Redirect::to(SECRETS_ROUTE))
}

/// Handlers behind [`require_auth`] read the user from this extension.
pub type Authenticated = Extension<CurrentUser>;
