//! Identity provider client
//!
//! Talks to a Keycloak realm (or any OIDC provider with the same discovery
//! layout):
//! - builds the authorization redirect
//! - redeems authorization codes at the token endpoint
//! - verifies ID and access tokens against the realm JWKS, cached with a TTL

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Signature algorithms accepted on provider tokens. Symmetric and `none` are never accepted.
const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// Operations the login flow and the gate need from an identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL carrying `response_type=code`, client id,
    /// redirect URI, scopes and `state`. Deterministic for a given state.
    fn build_authorization_url(&self, state: &str) -> String;

    /// Redeem an authorization code. Never retried.
    async fn exchange_code(&self, code: &str) -> Result<TokenBundle, ProviderError>;

    /// Verify signature, issuer, audience (the client id) and expiry
    async fn verify_id_token(&self, raw: &str) -> Result<ProviderClaims, ProviderError>;

    /// Verify signature, issuer and expiry. Audience is not checked.
    async fn verify_access_token(&self, raw: &str) -> Result<ProviderClaims, ProviderError>;
}

/// Connection settings for one realm and client
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Keycloak server URL (e.g., "https://keycloak.example.com")
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
    pub request_timeout: Duration,
    pub jwks_cache_ttl: Duration,
    /// Minimum age of the cached JWKS before an unknown `kid` may refetch it
    pub jwks_min_refetch_interval: Duration,
}

impl ProviderSettings {
    pub fn issuer_url(&self) -> String {
        format!("{}/realms/{}", self.base_url.trim_end_matches('/'), self.realm)
    }

    pub fn discovery_url(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.issuer_url())
    }
}

/// The parts of the discovery document this client uses
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Identity claims taken from a verified token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderClaims {
    pub subject: String,
    pub email: Option<String>,
    pub preferred_username: Option<String>,
    pub name: Option<String>,
    pub scopes: Vec<String>,
    pub realm_roles: Vec<String>,
    pub resource_roles: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RoleSet {
    #[serde(default)]
    roles: Vec<String>,
}

/// Keycloak token payload
#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    realm_access: Option<RoleSet>,
    #[serde(default)]
    resource_access: BTreeMap<String, RoleSet>,
}

impl From<RawClaims> for ProviderClaims {
    fn from(raw: RawClaims) -> Self {
        Self {
            subject: raw.sub,
            email: raw.email,
            preferred_username: raw.preferred_username,
            name: raw.name,
            scopes: raw
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            realm_roles: raw.realm_access.map(|r| r.roles).unwrap_or_default(),
            resource_roles: raw
                .resource_access
                .into_iter()
                .map(|(client, set)| (client, set.roles))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    kid: Option<String>,
    #[serde(rename = "use", default)]
    key_use: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

impl Jwk {
    fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().map_or(true, |u| u == "sig")
    }

    fn decoding_key(&self, alg: Algorithm) -> Result<DecodingKey, ProviderError> {
        let family_matches = match self.kty.as_str() {
            "RSA" => !matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            "EC" => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            _ => false,
        };
        if !family_matches {
            return Err(ProviderError::Verification(format!(
                "key type {} cannot verify {:?}",
                self.kty, alg
            )));
        }

        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| {
                    ProviderError::Verification("RSA key missing 'n' component".to_string())
                })?;
                let e = self.e.as_deref().ok_or_else(|| {
                    ProviderError::Verification("RSA key missing 'e' component".to_string())
                })?;
                DecodingKey::from_rsa_components(n, e).map_err(|e| {
                    ProviderError::Verification(format!("invalid RSA key: {}", e))
                })
            }
            _ => {
                let x = self.x.as_deref().ok_or_else(|| {
                    ProviderError::Verification("EC key missing 'x' component".to_string())
                })?;
                let y = self.y.as_deref().ok_or_else(|| {
                    ProviderError::Verification("EC key missing 'y' component".to_string())
                })?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| ProviderError::Verification(format!("invalid EC key: {}", e)))
            }
        }
    }
}

struct CachedJwks {
    jwks: Jwks,
    fetched_at: Instant,
}

/// OIDC client for one Keycloak realm
pub struct OidcProviderClient {
    settings: ProviderSettings,
    metadata: ProviderMetadata,
    http_client: reqwest::Client,
    jwks_cache: RwLock<Option<CachedJwks>>,
}

impl OidcProviderClient {
    /// Fetch the realm discovery document and build a client from it
    pub async fn discover(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let http_client = build_http_client(settings.request_timeout)?;
        let discovery_url = settings.discovery_url();

        debug!(url = %discovery_url, "Fetching OIDC discovery document");

        let response = http_client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| ProviderError::Discovery(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Discovery(format!(
                "discovery returned status {}",
                response.status()
            )));
        }

        let metadata: ProviderMetadata = response
            .json()
            .await
            .map_err(|e| ProviderError::Discovery(format!("invalid discovery document: {}", e)))?;

        let expected = settings.issuer_url();
        if metadata.issuer.trim_end_matches('/') != expected {
            return Err(ProviderError::Discovery(format!(
                "issuer mismatch: expected {}, provider reports {}",
                expected, metadata.issuer
            )));
        }

        info!(
            issuer = %metadata.issuer,
            client_id = %settings.client_id,
            "Identity provider discovered"
        );

        Ok(Self::with_http_client(settings, metadata, http_client))
    }

    /// Build a client from already known endpoints
    pub fn from_metadata(
        settings: ProviderSettings,
        metadata: ProviderMetadata,
    ) -> Result<Self, ProviderError> {
        let http_client = build_http_client(settings.request_timeout)?;
        Ok(Self::with_http_client(settings, metadata, http_client))
    }

    fn with_http_client(
        settings: ProviderSettings,
        metadata: ProviderMetadata,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            settings,
            metadata,
            http_client,
            jwks_cache: RwLock::new(None),
        }
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn fetch_jwks(&self) -> Result<Jwks, ProviderError> {
        debug!(jwks_uri = %self.metadata.jwks_uri, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.metadata.jwks_uri)
            .send()
            .await
            .map_err(|e| ProviderError::Verification(format!("JWKS fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::Verification(format!(
                "JWKS fetch returned status {}",
                response.status()
            )));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| ProviderError::Verification(format!("invalid JWKS: {}", e)))?;

        let mut cache = self.jwks_cache.write().await;
        *cache = Some(CachedJwks {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });

        info!(keys = jwks.keys.len(), "JWKS cache refreshed");
        Ok(jwks)
    }

    async fn cached_jwks(&self) -> Option<(Jwks, Instant)> {
        let cache = self.jwks_cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.settings.jwks_cache_ttl)
            .map(|c| (c.jwks.clone(), c.fetched_at))
    }

    /// Key for `kid`, refetching the JWKS once when the cache does not know it.
    /// A set younger than `jwks_min_refetch_interval` is not refetched.
    async fn signing_key(&self, kid: Option<&str>) -> Result<Jwk, ProviderError> {
        let (jwks, fetched_at, fetched_fresh) = match self.cached_jwks().await {
            Some((jwks, fetched_at)) => (jwks, fetched_at, false),
            None => (self.fetch_jwks().await?, Instant::now(), true),
        };

        if let Some(key) = find_key(&jwks, kid) {
            return Ok(key.clone());
        }
        if fetched_fresh || fetched_at.elapsed() < self.settings.jwks_min_refetch_interval {
            return Err(ProviderError::Verification(format!(
                "no signing key for kid {:?}",
                kid
            )));
        }

        // Possibly a rotated key
        debug!(?kid, "Unknown key id, refreshing JWKS");
        let jwks = self.fetch_jwks().await?;
        find_key(&jwks, kid)
            .cloned()
            .ok_or_else(|| ProviderError::Verification(format!("no signing key for kid {:?}", kid)))
    }

    async fn verify(&self, raw: &str, audience: Option<&str>) -> Result<ProviderClaims, ProviderError> {
        let header = decode_header(raw)
            .map_err(|e| ProviderError::Verification(format!("malformed token header: {}", e)))?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(ProviderError::Verification(format!(
                "algorithm {:?} not accepted",
                header.alg
            )));
        }

        let jwk = self.signing_key(header.kid.as_deref()).await?;
        let decoding_key = jwk.decoding_key(header.alg)?;

        let mut validation = Validation::new(header.alg);
        validation.set_issuer(&[&self.metadata.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        let token_data = decode::<RawClaims>(raw, &decoding_key, &validation)
            .map_err(|e| ProviderError::Verification(e.to_string()))?;

        Ok(token_data.claims.into())
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Discovery(format!("failed to build HTTP client: {}", e)))
}

/// Match by kid; tokens without a kid fall back to the first signing key
fn find_key<'a>(jwks: &'a Jwks, kid: Option<&str>) -> Option<&'a Jwk> {
    let mut signing = jwks.keys.iter().filter(|k| k.is_signing_key());
    match kid {
        Some(kid) => signing.find(|k| k.kid.as_deref() == Some(kid)),
        None => signing.next(),
    }
}

#[async_trait]
impl IdentityProvider for OidcProviderClient {
    fn build_authorization_url(&self, state: &str) -> String {
        let separator = if self.metadata.authorization_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{}response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.metadata.authorization_endpoint,
            separator,
            urlencoding::encode(&self.settings.client_id),
            urlencoding::encode(&self.settings.redirect_url),
            urlencoding::encode(&self.settings.scopes.join(" ")),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenBundle, ProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_url.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.metadata.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| ProviderError::Exchange(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {}", e.error, desc),
                    None => e.error,
                })
                .unwrap_or_else(|_| "unrecognised error body".to_string());
            warn!(%status, %reason, "Token endpoint rejected code exchange");
            return Err(ProviderError::Exchange(format!(
                "token endpoint returned {}: {}",
                status, reason
            )));
        }

        response
            .json::<TokenBundle>()
            .await
            .map_err(|e| ProviderError::Exchange(format!("invalid token response: {}", e)))
    }

    async fn verify_id_token(&self, raw: &str) -> Result<ProviderClaims, ProviderError> {
        self.verify(raw, Some(&self.settings.client_id)).await
    }

    async fn verify_access_token(&self, raw: &str) -> Result<ProviderClaims, ProviderError> {
        self.verify(raw, None).await
    }
}
