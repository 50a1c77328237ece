use hmac::{Hmac, Mac};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse,
    TokenUrl,
};
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;
use url::Url;

use super::{CallbackParams, OAuthError, PendingAuthorization};
use crate::config::ProviderConfig;
use crate::domain::Provider;

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// Google userinfo response. v3 names the subject `sub`, v2 calls it `id`.
#[derive(Debug, Deserialize)]
struct GoogleProfile {
    #[serde(alias = "id")]
    sub: String,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
}

pub struct OAuthProvider {
    provider: Provider,
    client: ConfiguredClient,
    client_secret: String,
    profile_url: Url,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl OAuthProvider {
    /// Build a provider whose callback lives at `{public_url}/auth/{slug}/secrets`.
    pub fn new(
        provider: Provider,
        config: &ProviderConfig,
        public_url: &str,
        http: reqwest::Client,
    ) -> Result<Self, OAuthError> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            OAuthError::InvalidConfig(format!("{provider} {what}: {e}"))
        };

        let redirect_url = format!(
            "{}/auth/{}/secrets",
            public_url.trim_end_matches('/'),
            provider.slug()
        );

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone()).map_err(|e| invalid("auth_url", &e))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone()).map_err(|e| invalid("token_url", &e))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_url).map_err(|e| invalid("redirect url", &e))?,
            )
            .set_auth_type(token_auth_type(provider));

        let profile_url =
            Url::parse(&config.profile_url).map_err(|e| invalid("profile_url", &e))?;

        Ok(Self {
            provider,
            client,
            client_secret: config.client_secret.clone(),
            profile_url,
            scopes: config.scopes.clone(),
            http,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    /// Build the provider redirect with a fresh CSRF state and PKCE challenge.
    #[must_use]
    pub fn authorize_url(&self) -> (Url, PendingAuthorization) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();

        let pending = PendingAuthorization {
            provider: self.provider,
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        };

        (auth_url, pending)
    }

    /// Finish the flow and return the provider's subject id for the account.
    ///
    /// `pending` is whatever the session held for this visitor; it is only
    /// ever used once.
    pub async fn complete(
        &self,
        params: CallbackParams,
        pending: Option<PendingAuthorization>,
    ) -> Result<String, OAuthError> {
        if let Some(error) = params.error {
            let detail = params
                .error_description
                .map_or_else(|| error.clone(), |d| format!("{error}: {d}"));
            return Err(OAuthError::Denied(detail));
        }

        let pending = pending
            .filter(|p| p.provider == self.provider)
            .ok_or(OAuthError::StateMismatch)?;

        if params.state.as_deref() != Some(pending.csrf_state.as_str()) {
            return Err(OAuthError::StateMismatch);
        }

        let code = params
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::Denied("missing authorization code".to_string()))?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pending.pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| OAuthError::TokenExchange(e.to_string()))?;

        debug!(provider = %self.provider, "Authorization code exchanged");

        self.fetch_subject(token.access_token().secret()).await
    }

    async fn fetch_subject(&self, access_token: &str) -> Result<String, OAuthError> {
        let profile_error = |e: reqwest::Error| OAuthError::Profile(e.to_string());

        match self.provider {
            Provider::Google => {
                let profile: GoogleProfile = self
                    .http
                    .get(self.profile_url.clone())
                    .bearer_auth(access_token)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(profile_error)?
                    .json()
                    .await
                    .map_err(profile_error)?;
                Ok(profile.sub)
            }
            Provider::Facebook => {
                let proof = appsecret_proof(&self.client_secret, access_token)?;
                let profile: FacebookProfile = self
                    .http
                    .get(self.profile_url.clone())
                    .query(&[
                        ("fields", "id"),
                        ("access_token", access_token),
                        ("appsecret_proof", proof.as_str()),
                    ])
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(profile_error)?
                    .json()
                    .await
                    .map_err(profile_error)?;
                Ok(profile.id)
            }
        }
    }
}

/// Google takes client credentials in a Basic header, Facebook's
/// `oauth/access_token` only reads them from the request parameters.
const fn token_auth_type(provider: Provider) -> AuthType {
    match provider {
        Provider::Google => AuthType::BasicAuth,
        Provider::Facebook => AuthType::RequestBody,
    }
}

/// Facebook's `appsecret_proof`: hex HMAC-SHA256 of the access token keyed
/// by the app secret.
pub fn appsecret_proof(app_secret: &str, access_token: &str) -> Result<String, OAuthError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes())
        .map_err(|e| OAuthError::InvalidConfig(e.to_string()))?;
    mac.update(access_token.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(kind: Provider) -> OAuthProvider {
        let mut config = match kind {
            Provider::Google => ProviderConfig::google(),
            Provider::Facebook => ProviderConfig::facebook(),
        };
        config.client_id = "client-123".to_string();
        config.client_secret = "shh".to_string();
        OAuthProvider::new(kind, &config, "https://board.example/", reqwest::Client::new())
            .unwrap()
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn authorize_url_carries_state_pkce_and_scope() {
        let google = provider(Provider::Google);
        let (url, pending) = google.authorize_url();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(query(&url, "client_id").as_deref(), Some("client-123"));
        assert_eq!(query(&url, "response_type").as_deref(), Some("code"));
        assert_eq!(query(&url, "scope").as_deref(), Some("profile"));
        assert_eq!(query(&url, "code_challenge_method").as_deref(), Some("S256"));
        assert_eq!(
            query(&url, "redirect_uri").as_deref(),
            Some("https://board.example/auth/google/secrets")
        );
        assert_eq!(query(&url, "state"), Some(pending.csrf_state.clone()));
        assert_eq!(pending.provider, Provider::Google);
        assert!(!pending.pkce_verifier.is_empty());
    }

    #[test]
    fn each_authorization_gets_a_fresh_state() {
        let facebook = provider(Provider::Facebook);
        let (_, first) = facebook.authorize_url();
        let (_, second) = facebook.authorize_url();
        assert_ne!(first.csrf_state, second.csrf_state);
        assert_ne!(first.pkce_verifier, second.pkce_verifier);
    }

    #[tokio::test]
    async fn provider_error_is_denied() {
        let google = provider(Provider::Google);
        let (_, pending) = google.authorize_url();
        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            state: Some(pending.csrf_state.clone()),
            ..CallbackParams::default()
        };

        assert!(matches!(
            google.complete(params, Some(pending)).await,
            Err(OAuthError::Denied(_))
        ));
    }

    #[tokio::test]
    async fn missing_or_wrong_state_is_rejected() {
        let google = provider(Provider::Google);
        let (_, pending) = google.authorize_url();

        let wrong = CallbackParams {
            code: Some("code".to_string()),
            state: Some("forged".to_string()),
            ..CallbackParams::default()
        };
        assert!(matches!(
            google.complete(wrong, Some(pending.clone())).await,
            Err(OAuthError::StateMismatch)
        ));

        let no_pending = CallbackParams {
            code: Some("code".to_string()),
            state: Some(pending.csrf_state.clone()),
            ..CallbackParams::default()
        };
        assert!(matches!(
            google.complete(no_pending, None).await,
            Err(OAuthError::StateMismatch)
        ));
    }

    #[tokio::test]
    async fn state_from_another_provider_is_rejected() {
        let google = provider(Provider::Google);
        let (_, facebook_pending) = provider(Provider::Facebook).authorize_url();
        let params = CallbackParams {
            code: Some("code".to_string()),
            state: Some(facebook_pending.csrf_state.clone()),
            ..CallbackParams::default()
        };

        assert!(matches!(
            google.complete(params, Some(facebook_pending)).await,
            Err(OAuthError::StateMismatch)
        ));
    }

    #[test]
    fn facebook_sends_client_credentials_in_the_body() {
        assert!(matches!(
            token_auth_type(Provider::Facebook),
            AuthType::RequestBody
        ));
        assert!(matches!(
            token_auth_type(Provider::Google),
            AuthType::BasicAuth
        ));
    }

    #[test]
    fn appsecret_proof_matches_reference_hmac() {
        let proof =
            appsecret_proof("key", "The quick brown fox jumps over the lazy dog").unwrap();
        assert_eq!(
            proof,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }
}
