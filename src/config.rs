use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Shortest accepted session secret, in bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub oauth: OAuthConfig,

    pub security: SecurityConfig,

    pub secrets: SecretsConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_url: String,

    pub log_level: String,

    /// Directory served for any path no route matches (stylesheets, images)
    pub public_path: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/secretboard.db".to_string(),
            log_level: "info".to_string(),
            public_path: "public".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            secure_cookies: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Key material for signing the session cookie. No default: must come
    /// from the config file or `SESSION_SECRET`.
    #[serde(skip_serializing)]
    pub secret: String,

    pub cookie_name: String,

    /// Sessions expire after this many minutes without a request
    pub ttl_minutes: i64,

    pub store: SessionStoreKind,

    /// How often expired rows are purged when `store = "database"`
    pub cleanup_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            cookie_name: "secretboard.sid".to_string(),
            ttl_minutes: 60 * 24,
            store: SessionStoreKind::Database,
            cleanup_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Externally visible base URL; callback URLs are built from it
    pub public_url: String,

    pub google: ProviderConfig,

    pub facebook: ProviderConfig,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            public_url: "http://localhost:3000".to_string(),
            google: ProviderConfig::google(),
            facebook: ProviderConfig::facebook(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default, skip_serializing)]
    pub client_secret: String,

    #[serde(default)]
    pub auth_url: String,

    #[serde(default)]
    pub token_url: String,

    /// Endpoint returning the signed-in account's subject id
    #[serde(default)]
    pub profile_url: String,

    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    #[must_use]
    pub fn google() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            profile_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            scopes: vec!["profile".to_string()],
        }
    }

    #[must_use]
    pub fn facebook() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            auth_url: "https://www.facebook.com/v19.0/dialog/oauth".to_string(),
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token".to_string(),
            profile_url: "https://graph.facebook.com/v19.0/me".to_string(),
            scopes: Vec::new(),
        }
    }

    /// Both halves of the client credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    fn is_partial(&self) -> bool {
        self.client_id.is_empty() != self.client_secret.is_empty()
    }

    /// Endpoints left out of a config file fall back to the provider's
    /// well-known URLs.
    fn fill_endpoints(&mut self, defaults: Self) {
        if self.auth_url.is_empty() {
            self.auth_url = defaults.auth_url;
        }
        if self.token_url.is_empty() {
            self.token_url = defaults.token_url;
        }
        if self.profile_url.is_empty() {
            self.profile_url = defaults.profile_url;
        }
        if self.scopes.is_empty() {
            self.scopes = defaults.scopes;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 19 * 1024,
            argon2_time_cost: 2,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Longest accepted secret, in characters
    pub max_length: usize,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self { max_length: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub json_logs: bool,

    pub metrics_enabled: bool,

    pub metrics_port: u16,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = HashMap::new();
        labels.insert("app".to_string(), "secretboard".to_string());

        Self {
            json_logs: false,
            metrics_enabled: false,
            metrics_port: 9100,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    /// Load the first config file found, then apply environment overrides
    /// (including a `.env` file in the working directory).
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.oauth.google.fill_endpoints(ProviderConfig::google());
        config.oauth.facebook.fill_endpoints(ProviderConfig::facebook());

        Ok(config)
    }

    /// Override settings from environment variables. The first name in each
    /// list wins over its aliases.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let first = |names: &[&str]| names.iter().copied().find_map(|name| lookup(name));

        if let Some(url) = first(&["DATABASE_URL"]) {
            self.general.database_url = url;
        }
        if let Some(secret) = first(&["SESSION_SECRET", "SECRET"]) {
            self.session.secret = secret;
        }
        if let Some(url) = first(&["PUBLIC_URL"]) {
            self.oauth.public_url = url;
        }
        if let Some(id) = first(&["GOOGLE_CLIENT_ID", "CLIENT_ID"]) {
            self.oauth.google.client_id = id;
        }
        if let Some(secret) = first(&["GOOGLE_CLIENT_SECRET", "CLIENT_SECRET"]) {
            self.oauth.google.client_secret = secret;
        }
        if let Some(id) = first(&["FACEBOOK_APP_ID"]) {
            self.oauth.facebook.client_id = id;
        }
        if let Some(secret) = first(&["FACEBOOK_APP_SECRET"]) {
            self.oauth.facebook.client_secret = secret;
        }
        if let Some(port) = first(&["PORT"]) {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {port}"))?;
        }

        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("secretboard").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".secretboard").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.secret.len() < MIN_SESSION_SECRET_LEN {
            anyhow::bail!(
                "Session secret must be set (SESSION_SECRET) and be at least {MIN_SESSION_SECRET_LEN} bytes"
            );
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port must be > 0");
        }

        if self.session.ttl_minutes <= 0 {
            anyhow::bail!("Session TTL must be > 0 minutes");
        }

        if self.secrets.max_length == 0 {
            anyhow::bail!("Secret max length must be > 0");
        }

        for (name, provider) in [
            ("google", &self.oauth.google),
            ("facebook", &self.oauth.facebook),
        ] {
            if provider.is_partial() {
                anyhow::bail!("OAuth provider '{name}' needs both a client id and a client secret");
            }
        }

        url::Url::parse(&self.oauth.public_url).context("Invalid oauth.public_url")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    fn valid() -> Config {
        let mut config = Config::default();
        config.session.secret = "x".repeat(MIN_SESSION_SECRET_LEN);
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.session.store, SessionStoreKind::Database);
        assert!(config.session.secret.is_empty());
        assert!(!config.oauth.google.is_configured());
        assert_eq!(config.oauth.google.scopes, vec!["profile".to_string()]);
    }

    #[test]
    fn test_config_serialization_omits_secrets() {
        let mut config = valid();
        config.oauth.google.client_secret = "google-secret".to_string();

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[session]"));
        assert!(!toml_str.contains(&config.session.secret));
        assert!(!toml_str.contains("google-secret"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [session]
            store = "memory"
            ttl_minutes = 30
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.session.store, SessionStoreKind::Memory);
        assert_eq!(config.session.ttl_minutes, 30);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn partial_provider_table_keeps_default_endpoints() {
        let path = std::env::temp_dir().join(format!(
            "secretboard-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "[oauth.google]\nclient_id = \"abc\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.oauth.google.client_id, "abc");
        assert_eq!(config.oauth.google.auth_url, ProviderConfig::google().auth_url);
        assert_eq!(config.oauth.google.scopes, vec!["profile".to_string()]);
    }

    #[test]
    fn env_overrides_take_precedence_over_aliases() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SECRET", "legacy"),
                ("SESSION_SECRET", "preferred"),
                ("CLIENT_ID", "legacy-google-id"),
                ("FACEBOOK_APP_ID", "fb-id"),
                ("PORT", "8080"),
                ("DATABASE_URL", "sqlite::memory:"),
            ]))
            .unwrap();

        assert_eq!(config.session.secret, "preferred");
        assert_eq!(config.oauth.google.client_id, "legacy-google-id");
        assert_eq!(config.oauth.facebook.client_id, "fb-id");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.general.database_url, "sqlite::memory:");
    }

    #[test]
    fn invalid_port_in_env_is_an_error() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn validate_requires_a_session_secret() {
        assert!(Config::default().validate().is_err());

        let mut short = Config::default();
        short.session.secret = "too-short".to_string();
        assert!(short.validate().is_err());

        assert!(valid().validate().is_ok());
    }

    #[test]
    fn validate_rejects_half_configured_provider() {
        let mut config = valid();
        config.oauth.facebook.client_id = "id-only".to_string();
        assert!(config.validate().is_err());

        config.oauth.facebook.client_secret = "and-secret".to_string();
        assert!(config.validate().is_ok());
        assert!(config.oauth.facebook.is_configured());
    }
}
