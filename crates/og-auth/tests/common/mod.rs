//! Shared test harness: a wiremock Keycloak realm and RSA-signed tokens

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    middleware,
    routing::get,
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use og_auth::{
    auth_router, require_session, AuthState, Authenticated, MemorySessionStore,
    MemoryStateStore, OidcProviderClient, ProviderSettings, SessionSettings,
};

pub const REALM: &str = "test";
pub const CLIENT_ID: &str = "gate-app";
pub const KID: &str = "test-key-1";

/// Modulus of `fixtures/test_rsa_key.pem`, base64url
pub const JWK_N: &str = "xlK_RiNyUKucjTu_lan_aYzHsUwk4PW1qmgsZgoQXPgjZtgZWKQgm4oavSQP-eMiL8wBtK99QMdoUEMx3Zm10om8D9m3cuemnPSD_J5lm2QHfcnwhxKlvN11yVeAx9aNAxpIYv-iAn4PjTNu5bmknGoabo_mhugzQUBle8KHodOuZH9JsXNuHtSRb2l_dNthOMN2v99FRWUFEK1BSXoMjIB3pm00fn9ndXkjbJJtH3jID9Reu71KPCDQ9WyIrMwxVtwMJq4JStURnof5Di3RT3oeBN3XnRM7fgGISqeJU1tEayN6txsCg5x9L3gS9higfvuLgGReNLmwBpMog75yVw";
pub const JWK_E: &str = "AQAB";

pub fn encoding_key() -> EncodingKey {
    EncodingKey::from_rsa_pem(include_bytes!("../fixtures/test_rsa_key.pem")).unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn jwks_with_kid(kid: &str) -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": JWK_N,
            "e": JWK_E
        }]
    })
}

/// Simulated Keycloak realm
pub struct MockProvider {
    pub server: MockServer,
}

impl MockProvider {
    /// Start a realm serving discovery and the test JWKS
    pub async fn start() -> Self {
        let provider = Self::start_without_jwks().await;
        Mock::given(method("GET"))
            .and(path(provider.jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_with_kid(KID)))
            .mount(&provider.server)
            .await;
        provider
    }

    /// Start a realm serving discovery only; tests mount their own JWKS
    pub async fn start_without_jwks() -> Self {
        let server = MockServer::start().await;
        let provider = Self { server };

        Mock::given(method("GET"))
            .and(path(format!("/realms/{}/.well-known/openid-configuration", REALM)))
            .respond_with(ResponseTemplate::new(200).set_body_json(provider.discovery_document()))
            .mount(&provider.server)
            .await;

        provider
    }

    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server.uri(), REALM)
    }

    pub fn token_path(&self) -> String {
        format!("/realms/{}/protocol/openid-connect/token", REALM)
    }

    pub fn jwks_path(&self) -> String {
        format!("/realms/{}/protocol/openid-connect/certs", REALM)
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.issuer())
    }

    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "authorization_endpoint": self.authorization_endpoint(),
            "token_endpoint": format!("{}{}", self.server.uri(), self.token_path()),
            "jwks_uri": format!("{}{}", self.server.uri(), self.jwks_path()),
            "end_session_endpoint": format!("{}/protocol/openid-connect/logout", self.issuer()),
        })
    }

    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            base_url: self.server.uri(),
            realm: REALM.to_string(),
            client_id: CLIENT_ID.to_string(),
            client_secret: "test-secret".to_string(),
            redirect_url: "http://localhost:8080/auth/callback".to_string(),
            scopes: vec!["openid".to_string(), "profile".to_string(), "email".to_string()],
            request_timeout: Duration::from_secs(5),
            jwks_cache_ttl: Duration::from_secs(3600),
            jwks_min_refetch_interval: Duration::from_secs(30),
        }
    }

    pub async fn client(&self) -> OidcProviderClient {
        OidcProviderClient::discover(self.settings()).await.unwrap()
    }

    pub fn sign_with_kid(&self, kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &encoding_key()).unwrap()
    }

    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with_kid(KID, claims)
    }

    pub fn id_token_claims(&self, email: &str, username: &str) -> Value {
        json!({
            "iss": self.issuer(),
            "aud": CLIENT_ID,
            "sub": "f0c1d2e3-0000-4000-8000-000000000001",
            "iat": now(),
            "exp": now() + 300,
            "email": email,
            "preferred_username": username,
            "name": "Alice Liddell"
        })
    }

    pub fn id_token(&self, email: &str, username: &str) -> String {
        self.sign(&self.id_token_claims(email, username))
    }

    pub fn access_token_claims(&self, expires_in: i64) -> Value {
        json!({
            "iss": self.issuer(),
            "aud": "account",
            "azp": CLIENT_ID,
            "sub": "f0c1d2e3-0000-4000-8000-000000000001",
            "iat": now(),
            "exp": now() + expires_in,
            "scope": "openid profile email",
            "preferred_username": "alice",
            "email": "a@b.com",
            "realm_access": { "roles": ["user"] },
            "resource_access": { "account": { "roles": ["view-profile"] } }
        })
    }

    pub fn access_token(&self) -> String {
        self.sign(&self.access_token_claims(300))
    }

    pub fn expired_access_token(&self) -> String {
        self.sign(&self.access_token_claims(-3600))
    }

    /// Token endpoint answering with a valid bundle for alice, expected `times` times
    pub async fn mount_token_endpoint(&self, times: u64) {
        let body = json!({
            "access_token": self.access_token(),
            "id_token": self.id_token("a@b.com", "alice"),
            "token_type": "Bearer",
            "expires_in": 300,
            "scope": "openid profile email"
        });
        self.mount_token_response(ResponseTemplate::new(200).set_body_json(body), times)
            .await;
    }

    pub async fn mount_token_response(&self, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path(self.token_path()))
            .respond_with(response)
            .expect(times)
            .mount(&self.server)
            .await;
    }
}

/// Login routes and one protected page over in-memory stores
pub struct TestApp {
    pub provider: MockProvider,
    pub auth: AuthState,
    pub states: Arc<MemoryStateStore>,
    pub sessions: Arc<MemorySessionStore>,
    pub router: Router,
}

impl TestApp {
    pub async fn start() -> Self {
        Self::with_provider(MockProvider::start().await).await
    }

    pub async fn with_provider(provider: MockProvider) -> Self {
        let states = Arc::new(MemoryStateStore::new(Duration::from_secs(300)));
        let sessions = Arc::new(MemorySessionStore::new());
        let auth = AuthState::new(
            Arc::new(provider.client().await),
            states.clone(),
            sessions.clone(),
            SessionSettings::default(),
        );
        let router = app_router(auth.clone());

        Self {
            provider,
            auth,
            states,
            sessions,
            router,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }
}

async fn dashboard(Authenticated(context): Authenticated) -> String {
    format!(
        "hello {} ({})",
        context.record.profile.display_name,
        context.claims.realm_roles.join(",")
    )
}

async fn unguarded(Authenticated(context): Authenticated) -> String {
    context.record.profile.display_name
}

pub fn app_router(auth: AuthState) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(dashboard))
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_session));

    Router::new()
        .nest("/auth", auth_router(auth))
        .merge(protected)
        .route("/unguarded", get(unguarded))
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the `session_id` cookie set by a response, if any
pub fn session_cookie_value(response: &Response<Body>) -> Option<String> {
    set_cookies(response).iter().find_map(|c| {
        c.strip_prefix("session_id=")
            .map(|rest| rest.split(';').next().unwrap_or_default().to_string())
    })
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn assert_redirect(response: &Response<Body>) {
    assert!(
        response.status().is_redirection(),
        "expected redirect, got {}",
        response.status()
    );
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}
