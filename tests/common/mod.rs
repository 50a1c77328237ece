#![allow(dead_code)]

use axum::{
    Form, Json, Router,
    body::Body,
    extract::Query,
    http::{HeaderMap, Request, Response, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use http_body_util::BodyExt;
use secretboard::api::{AppState, create_app_state, router};
use secretboard::config::{Config, ProviderConfig, SecurityConfig, SessionStoreKind};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const FACEBOOK_APP_ID: &str = "facebook-app";
pub const FACEBOOK_SECRET: &str = "facebook-app-secret";

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_url = "sqlite::memory:".to_string();
    config.general.public_path = concat!(env!("CARGO_MANIFEST_DIR"), "/public").to_string();
    config.server.secure_cookies = false;
    config.session.secret = "integration-test-session-secret-0123456789".to_string();
    config.session.store = SessionStoreKind::Memory;
    config.security = SecurityConfig {
        argon2_memory_cost_kib: 1024,
        argon2_time_cost: 1,
        argon2_parallelism: 1,
    };
    config
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub async fn spawn(config: Config) -> Self {
        let state = create_app_state(config)
            .await
            .expect("Failed to create app state");
        let router = router(state.clone()).expect("Failed to build router");
        Self { router, state }
    }

    /// A browser with an empty cookie jar.
    pub fn client(&self) -> TestClient {
        TestClient {
            app: self.router.clone(),
            cookie: None,
        }
    }
}

pub struct TestClient {
    app: Router,
    pub cookie: Option<String>,
}

impl TestClient {
    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        let request = Request::builder().method("GET").uri(uri);
        self.send(request, Body::empty()).await
    }

    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response<Body> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        self.send(request, Body::from(body)).await
    }

    async fn send(&mut self, mut request: axum::http::request::Builder, body: Body) -> Response<Body> {
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }

        let response = self
            .app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie
                .to_str()
                .unwrap()
                .split(';')
                .next()
                .unwrap()
                .trim()
                .to_string();
            let value = pair.split_once('=').map(|(_, v)| v).unwrap_or_default();
            self.cookie = if value.is_empty() { None } else { Some(pair) };
        }

        response
    }

    /// Register and keep the resulting session.
    pub async fn register(&mut self, username: &str, password: &str) -> Response<Body> {
        self.post_form(
            "/register",
            &[("username", username), ("password", password)],
        )
        .await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Response<Body> {
        self.post_form("/login", &[("username", username), ("password", password)])
            .await
    }
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("response has no Location header")
        .to_str()
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn assert_redirect(response: &Response<Body>, to: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), to);
}

// ============================================================================
// Stand-in OAuth provider
// ============================================================================

/// Serve token and profile endpoints on a random local port. The access
/// token is `token-{code}` and the profile subject is the code itself.
pub async fn spawn_mock_provider() -> String {
    let app = Router::new()
        .route("/google/token", post(google_token))
        .route("/facebook/token", post(facebook_token))
        .route("/userinfo", get(google_userinfo))
        .route("/me", get(facebook_me));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// Google clients authenticate with HTTP Basic (`google-client:google-secret`).
const GOOGLE_BASIC_AUTH: &str = "Basic Z29vZ2xlLWNsaWVudDpnb29nbGUtc2VjcmV0";

async fn google_token(
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    let basic = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if basic != Some(GOOGLE_BASIC_AUTH) {
        return token_error("invalid_client");
    }
    issue_token(&form)
}

/// Facebook only reads the app credentials from the request parameters.
async fn facebook_token(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
    let app_id = form.get("client_id").map(String::as_str);
    let app_secret = form.get("client_secret").map(String::as_str);
    if app_id != Some(FACEBOOK_APP_ID) || app_secret != Some(FACEBOOK_SECRET) {
        return token_error("invalid_client");
    }
    issue_token(&form)
}

fn issue_token(form: &HashMap<String, String>) -> Response<Body> {
    match (form.get("code"), form.get("code_verifier")) {
        (Some(code), Some(_)) => Json(json!({
            "access_token": format!("token-{code}"),
            "token_type": "bearer",
            "expires_in": 3600,
        }))
        .into_response(),
        _ => token_error("invalid_request"),
    }
}

fn token_error(error: &str) -> Response<Body> {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response()
}

async fn google_userinfo(headers: HeaderMap) -> impl IntoResponse {
    let subject = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer token-"))
        .map(str::to_string);

    match subject {
        Some(sub) => Json(json!({ "sub": sub })).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn facebook_me(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
    let (Some(token), Some(proof)) = (query.get("access_token"), query.get("appsecret_proof"))
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let expected = secretboard::oauth::appsecret_proof(FACEBOOK_SECRET, token).unwrap();
    match token.strip_prefix("token-") {
        Some(id) if *proof == expected => Json(json!({ "id": id })).into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

pub fn with_mock_providers(config: &mut Config, base: &str) {
    config.oauth.public_url = "http://localhost:3000".to_string();
    config.oauth.google = ProviderConfig {
        client_id: "google-client".to_string(),
        client_secret: "google-secret".to_string(),
        auth_url: format!("{base}/authorize"),
        token_url: format!("{base}/google/token"),
        profile_url: format!("{base}/userinfo"),
        scopes: vec!["profile".to_string()],
    };
    config.oauth.facebook = ProviderConfig {
        client_id: FACEBOOK_APP_ID.to_string(),
        client_secret: FACEBOOK_SECRET.to_string(),
        auth_url: format!("{base}/dialog/oauth"),
        token_url: format!("{base}/facebook/token"),
        profile_url: format!("{base}/me"),
        scopes: Vec::new(),
    };
}
