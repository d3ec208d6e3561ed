//! OIDC Gate Configuration System
//!
//! TOML-based configuration with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::{apply_env_overrides, ConfigLoader};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub session: SessionConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for handling a single inbound request
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl HttpConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Identity provider (Keycloak realm) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Keycloak server URL (e.g., "https://keycloak.example.com")
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the provider
    pub redirect_url: String,
    pub scopes: Vec<String>,
    /// Timeout for discovery, JWKS and token endpoint calls
    pub request_timeout_secs: u64,
    pub jwks_cache_ttl_secs: u64,
    /// Minimum cache age before an unknown key id refetches the JWKS
    pub jwks_min_refetch_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            realm: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_url: String::new(),
            scopes: vec![
                "openid".to_string(),
                "profile".to_string(),
                "email".to_string(),
            ],
            request_timeout_secs: 10,
            jwks_cache_ttl_secs: 3600,
            jwks_min_refetch_secs: 30,
        }
    }
}

/// Backing store for login state and sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}', expected 'redis' or 'memory'",
                other
            ))),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Lifetime of a pending login state
    pub state_ttl_secs: u64,
    /// Prefix for every key written to the store
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            state_ttl_secs: 300,
            key_prefix: "og".to_string(),
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_ms: u64,
    pub response_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connection_timeout_ms: 2000,
            response_timeout_ms: 1000,
        }
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Absolute session lifetime, counted from login
    pub ttl_secs: u64,
    pub secure: bool,
    /// Where unauthenticated requests are sent
    pub login_path: String,
    /// Where a completed login lands
    pub landing_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session_id".to_string(),
            ttl_secs: 300,
            secure: true,
            login_path: "/auth/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Check that the configuration can run a server
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("provider.base_url", &self.provider.base_url),
            ("provider.realm", &self.provider.realm),
            ("provider.client_id", &self.provider.client_id),
            ("provider.redirect_url", &self.provider.redirect_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} is required", name)));
            }
        }

        if !self.provider.scopes.iter().any(|s| s == "openid") {
            return Err(ConfigError::ValidationError(
                "provider.scopes must include 'openid'".to_string(),
            ));
        }
        if self.session.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.store.state_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "store.state_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !self.session.login_path.starts_with('/') || !self.session.landing_path.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "session.login_path and session.landing_path must be absolute paths".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# OIDC Gate Configuration
# Environment variables override these settings

[http]
host = "0.0.0.0"
port = 8080
request_timeout_secs = 30

[provider]
base_url = "https://keycloak.example.com"
realm = "my-realm"
client_id = "my-app"
client_secret = ""
redirect_url = "http://localhost:8080/auth/callback"
scopes = ["openid", "profile", "email"]
request_timeout_secs = 10
jwks_cache_ttl_secs = 3600
jwks_min_refetch_secs = 30

[store]
backend = "redis"  # redis or memory
state_ttl_secs = 300
key_prefix = "og"

[redis]
url = "redis://127.0.0.1:6379/0"
connection_timeout_ms = 2000
response_timeout_ms = 1000

[session]
cookie_name = "session_id"
ttl_secs = 300
secure = true
login_path = "/auth/login"
landing_path = "/dashboard"
"#
        .to_string()
    }
}
