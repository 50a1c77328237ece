use axum::{
    Extension, Form,
    extract::State,
    response::{Html, Redirect},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{Authenticated, CurrentUser};
use super::{ApiError, AppState};
use crate::auth::gate::LOGIN_ROUTE;
use crate::auth::session;
use crate::domain::Provider;
use crate::services::SecretError;
use crate::views;

#[derive(Deserialize)]
pub struct SecretForm {
    #[serde(default)]
    pub secret: String,
}

fn configured_providers(state: &AppState) -> Vec<Provider> {
    Provider::ALL
        .into_iter()
        .filter(|p| state.oauth.is_configured(*p))
        .collect()
}

/// GET /
pub async fn home() -> Html<String> {
    Html(views::home())
}

/// GET /login
pub async fn login(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(views::login(&configured_providers(&state)))
}

/// GET /register
pub async fn register(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(views::register(&configured_providers(&state)))
}

/// GET /secrets
pub async fn secrets(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Html<String>, ApiError> {
    let entries = state.secrets.list().await?;
    let signed_in = session::resolve(&session).await?.user_id().is_some();
    Ok(Html(views::secrets(&entries, signed_in)))
}

/// GET /submit
pub async fn submit_form(State(state): State<Arc<AppState>>, _user: Authenticated) -> Html<String> {
    Html(views::submit(state.config.secrets.max_length))
}

/// POST /submit
pub async fn submit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Extension(CurrentUser(user_id)): Authenticated,
    Form(form): Form<SecretForm>,
) -> Result<Redirect, ApiError> {
    match state.secrets.submit(user_id, &form.secret).await {
        Ok(()) => Ok(Redirect::to("/secrets")),
        Err(SecretError::NotFound) => {
            // The session outlived its user.
            tracing::warn!(user_id = %user_id, "Session refers to a missing user");
            session::destroy(&session).await?;
            Err(ApiError::Redirect(LOGIN_ROUTE))
        }
        Err(e) => Err(e.into()),
    }
}
