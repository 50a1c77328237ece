use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::fmt;

use crate::auth::gate::LOGIN_ROUTE;
use crate::services::{AuthError, SecretError};
use crate::views;

#[derive(Debug)]
pub enum ApiError {
    /// A recoverable failure: send the visitor back to a form. Carries no
    /// detail so nothing about the account leaks.
    Redirect(&'static str),

    NotFound(String),

    DatabaseError(String),

    InternalError(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect(to) => write!(f, "Redirect to {to}"),
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Redirect(to) => return Redirect::to(to).into_response(),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.as_str()),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred",
                )
            }
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred",
                )
            }
        };

        (status, Html(views::error_page(status.as_u16(), message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::auth(err, LOGIN_ROUTE)
    }
}

impl ApiError {
    pub fn not_found(resource: &str) -> Self {
        Self::NotFound(format!("{resource} not found"))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    /// Map an authentication failure for a request that started at `origin`.
    /// Credential and input problems go back to that form, provider failures
    /// go to the login page, and store trouble is a server error.
    pub fn auth(err: AuthError, origin: &'static str) -> Self {
        match err {
            AuthError::InvalidCredentials
            | AuthError::DuplicateIdentity
            | AuthError::Validation(_)
            | AuthError::NotFound => {
                tracing::info!(error = %err, redirect = origin, "Authentication rejected");
                Self::Redirect(origin)
            }
            AuthError::UpstreamAuthFailure(msg) => {
                tracing::warn!(error = %msg, "External sign-in failed");
                Self::Redirect(LOGIN_ROUTE)
            }
            AuthError::StoreUnavailable(msg) => Self::DatabaseError(msg),
            AuthError::Session(msg) | AuthError::Internal(msg) => Self::InternalError(msg),
        }
    }
}

impl From<SecretError> for ApiError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::Validation(msg) => {
                tracing::info!(error = %msg, "Secret rejected");
                Self::Redirect("/submit")
            }
            SecretError::NotFound => Self::Redirect(LOGIN_ROUTE),
            SecretError::StoreUnavailable(msg) => Self::DatabaseError(msg),
        }
    }
}
