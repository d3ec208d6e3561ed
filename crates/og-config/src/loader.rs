//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError, StoreBackend};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "oidc-gate.toml",
    "./config/config.toml",
    "./config/oidc-gate.toml",
    "/etc/oidc-gate/config.toml",
];

const ENV_PREFIX: &str = "OIDC_GATE_";

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_env_overrides(&mut config, |key| env::var(key).ok())?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("OIDC_GATE_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Prefixed `OIDC_GATE_*` variables win over the bare deployment names
/// (`KEYCLOAK_*`, `REDIS_*`, `APP_*`) when both are set.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str, legacy: Option<&str>| -> Option<String> {
        lookup(&format!("{}{}", ENV_PREFIX, name))
            .or_else(|| legacy.and_then(|l| lookup(l)))
            .filter(|v| !v.trim().is_empty())
    };

    // HTTP
    if let Some(val) = var("HTTP_HOST", Some("APP_HOST")) {
        config.http.host = val;
    }
    if let Some(val) = var("HTTP_PORT", Some("APP_PORT")) {
        config.http.port = parse_number("HTTP_PORT", &val)?;
    }
    if let Some(val) = var("HTTP_REQUEST_TIMEOUT_SECS", None) {
        config.http.request_timeout_secs = parse_number("HTTP_REQUEST_TIMEOUT_SECS", &val)?;
    }

    // Provider
    if let Some(val) = var("PROVIDER_BASE_URL", Some("KEYCLOAK_BASE_URL")) {
        config.provider.base_url = val;
    }
    if let Some(val) = var("PROVIDER_REALM", Some("KEYCLOAK_REALM")) {
        config.provider.realm = val;
    }
    if let Some(val) = var("PROVIDER_CLIENT_ID", Some("KEYCLOAK_CLIENT_ID")) {
        config.provider.client_id = val;
    }
    if let Some(val) = var("PROVIDER_CLIENT_SECRET", Some("KEYCLOAK_CLIENT_SECRET")) {
        config.provider.client_secret = val;
    }
    if let Some(val) = var("PROVIDER_REDIRECT_URL", Some("KEYCLOAK_REDIRECT_URL")) {
        config.provider.redirect_url = val;
    }
    if let Some(val) = var("PROVIDER_SCOPES", None) {
        config.provider.scopes = val
            .split([',', ' '])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(val) = var("PROVIDER_REQUEST_TIMEOUT_SECS", None) {
        config.provider.request_timeout_secs =
            parse_number("PROVIDER_REQUEST_TIMEOUT_SECS", &val)?;
    }
    if let Some(val) = var("PROVIDER_JWKS_CACHE_TTL_SECS", None) {
        config.provider.jwks_cache_ttl_secs = parse_number("PROVIDER_JWKS_CACHE_TTL_SECS", &val)?;
    }
    if let Some(val) = var("PROVIDER_JWKS_MIN_REFETCH_SECS", None) {
        config.provider.jwks_min_refetch_secs =
            parse_number("PROVIDER_JWKS_MIN_REFETCH_SECS", &val)?;
    }

    // Store
    if let Some(val) = var("STORE_BACKEND", None) {
        config.store.backend = val.parse::<StoreBackend>()?;
    }
    if let Some(val) = var("STORE_STATE_TTL_SECS", None) {
        config.store.state_ttl_secs = parse_number("STORE_STATE_TTL_SECS", &val)?;
    }
    if let Some(val) = var("STORE_KEY_PREFIX", None) {
        config.store.key_prefix = val;
    }

    // Redis: a full URL wins, otherwise host/port/database are assembled into one
    if let Some(val) = var("REDIS_URL", None) {
        config.redis.url = val;
    } else {
        let host = lookup("REDIS_HOST").filter(|v| !v.is_empty());
        let port = lookup("REDIS_PORT").filter(|v| !v.is_empty());
        let database = lookup("REDIS_DATABASE").filter(|v| !v.is_empty());
        if host.is_some() || port.is_some() || database.is_some() {
            let port: u16 = match port {
                Some(p) => parse_number("REDIS_PORT", &p)?,
                None => 6379,
            };
            let database: u32 = match database {
                Some(d) => parse_number("REDIS_DATABASE", &d)?,
                None => 0,
            };
            config.redis.url = format!(
                "redis://{}:{}/{}",
                host.unwrap_or_else(|| "127.0.0.1".to_string()),
                port,
                database
            );
        }
    }
    if let Some(val) = var("REDIS_CONNECTION_TIMEOUT_MS", None) {
        config.redis.connection_timeout_ms = parse_number("REDIS_CONNECTION_TIMEOUT_MS", &val)?;
    }
    if let Some(val) = var("REDIS_RESPONSE_TIMEOUT_MS", None) {
        config.redis.response_timeout_ms = parse_number("REDIS_RESPONSE_TIMEOUT_MS", &val)?;
    }

    // Session
    if let Some(val) = var("SESSION_COOKIE_NAME", None) {
        config.session.cookie_name = val;
    }
    if let Some(val) = var("SESSION_TTL_SECS", None) {
        config.session.ttl_secs = parse_number("SESSION_TTL_SECS", &val)?;
    }
    if let Some(val) = var("SESSION_SECURE", None) {
        config.session.secure = parse_bool("SESSION_SECURE", &val)?;
    }
    if let Some(val) = var("SESSION_LOGIN_PATH", None) {
        config.session.login_path = val;
    }
    if let Some(val) = var("SESSION_LANDING_PATH", None) {
        config.session.landing_path = val;
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{} is not a valid number: '{}'", name, value))
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::ValidationError(format!(
            "{} is not a valid boolean: '{}'",
            name, value
        ))),
    }
}
