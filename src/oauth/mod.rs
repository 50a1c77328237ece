//! # OAuth 2.0 sign-in with external identity providers
//!
//! Implements the Authorization Code flow with PKCE for Google and Facebook.
//! The only thing the rest of the application needs from a provider is the
//! stable subject id of the signed-in account; tokens are discarded once the
//! profile request has been made.
//!
//! ## Flow
//!
//! 1. [`OAuthProvider::authorize_url`] builds the redirect to the provider with a
//!    random CSRF `state` and a SHA-256 PKCE challenge. The returned
//!    [`PendingAuthorization`] is stashed in the visitor's session.
//! 2. [`OAuthProvider::complete`] runs on the callback route. It consumes the
//!    pending authorization, rejects a missing or mismatched `state`, exchanges
//!    the code (with the PKCE verifier) and fetches the subject id.

mod provider;

pub use provider::{OAuthProvider, appsecret_proof};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::OAuthConfig;
use crate::domain::Provider;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("{0} sign-in is not configured")]
    NotConfigured(Provider),

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("authorization state missing or mismatched")]
    StateMismatch,

    #[error("provider denied the request: {0}")]
    Denied(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("profile request failed: {0}")]
    Profile(String),
}

/// State that must survive the round trip to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub provider: Provider,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

/// Query string the provider appends to the callback URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// The configured providers. A provider without client credentials is
/// simply absent.
pub struct OAuthClients {
    google: Option<OAuthProvider>,
    facebook: Option<OAuthProvider>,
}

impl OAuthClients {
    pub fn from_config(config: &OAuthConfig) -> Result<Self, OAuthError> {
        let http = reqwest::Client::builder()
            // Following redirects during the token exchange would let a
            // hostile endpoint bounce the request elsewhere.
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(15))
            .user_agent(concat!("secretboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OAuthError::InvalidConfig(e.to_string()))?;

        let build = |provider: Provider| -> Result<Option<OAuthProvider>, OAuthError> {
            let provider_config = match provider {
                Provider::Google => &config.google,
                Provider::Facebook => &config.facebook,
            };
            if !provider_config.is_configured() {
                return Ok(None);
            }
            OAuthProvider::new(provider, provider_config, &config.public_url, http.clone())
                .map(Some)
        };

        Ok(Self {
            google: build(Provider::Google)?,
            facebook: build(Provider::Facebook)?,
        })
    }

    pub fn get(&self, provider: Provider) -> Result<&OAuthProvider, OAuthError> {
        match provider {
            Provider::Google => self.google.as_ref(),
            Provider::Facebook => self.facebook.as_ref(),
        }
        .ok_or(OAuthError::NotConfigured(provider))
    }

    #[must_use]
    pub fn is_configured(&self, provider: Provider) -> bool {
        self.get(provider).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_providers_are_absent() {
        let clients = OAuthClients::from_config(&OAuthConfig::default()).unwrap();
        assert!(!clients.is_configured(Provider::Google));
        assert!(matches!(
            clients.get(Provider::Facebook),
            Err(OAuthError::NotConfigured(Provider::Facebook))
        ));
    }

    #[test]
    fn configured_provider_is_available() {
        let mut config = OAuthConfig::default();
        config.google.client_id = "id".to_string();
        config.google.client_secret = "secret".to_string();

        let clients = OAuthClients::from_config(&config).unwrap();
        assert!(clients.is_configured(Provider::Google));
        assert!(!clients.is_configured(Provider::Facebook));
    }

    #[test]
    fn bad_endpoint_is_a_config_error() {
        let mut config = OAuthConfig::default();
        config.facebook.client_id = "id".to_string();
        config.facebook.client_secret = "secret".to_string();
        config.facebook.token_url = "not a url".to_string();

        assert!(matches!(
            OAuthClients::from_config(&config),
            Err(OAuthError::InvalidConfig(_))
        ));
    }
}
