//! Request authentication gate tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use og_auth::{
    AuthState, GateOutcome, SessionRecord, SessionSettings, SessionStore, StoreError, UserProfile,
};

use common::{assert_redirect, body_string, location, set_cookies, TestApp};

fn record(access_token: String) -> SessionRecord {
    SessionRecord {
        access_token,
        profile: UserProfile {
            display_name: "alice".to_string(),
            email: Some("a@b.com".to_string()),
        },
    }
}

fn assert_cookie_cleared(cookies: &[String]) {
    assert_eq!(cookies.len(), 1, "expected one Set-Cookie, got {:?}", cookies);
    assert!(cookies[0].starts_with("session_id=;"));
    assert!(cookies[0].contains("Max-Age=0"));
}

#[tokio::test]
async fn test_no_cookie_redirects_to_login() {
    let app = TestApp::start().await;

    let response = app.get("/dashboard", None).await;
    assert_redirect(&response);
    assert_eq!(location(&response), "/auth/login");
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_unknown_session_clears_cookie() {
    let app = TestApp::start().await;

    let response = app.get("/dashboard", Some("session_id=not-a-session")).await;
    assert_redirect(&response);
    assert_eq!(location(&response), "/auth/login");
    assert_cookie_cleared(&set_cookies(&response));
}

#[tokio::test]
async fn test_expired_session_clears_cookie() {
    let app = TestApp::start().await;
    app.sessions
        .save("sid", &record(app.provider.access_token()), Duration::from_millis(20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = app.get("/dashboard", Some("session_id=sid")).await;
    assert_redirect(&response);
    assert_eq!(location(&response), "/auth/login");
    assert_cookie_cleared(&set_cookies(&response));
}

#[tokio::test]
async fn test_valid_session_is_admitted() {
    let app = TestApp::start().await;
    app.sessions
        .save("sid", &record(app.provider.access_token()), Duration::from_secs(300))
        .await
        .unwrap();

    let response = app.get("/dashboard", Some("session_id=sid")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_string(response).await, "hello alice (user)");

    // Admission does not consume the session
    assert!(app.sessions.load("sid").await.unwrap().is_some());
}

#[tokio::test]
async fn test_rejected_access_token_invalidates_session() {
    let app = TestApp::start().await;
    app.sessions
        .save("sid", &record(app.provider.expired_access_token()), Duration::from_secs(300))
        .await
        .unwrap();

    let response = app.get("/dashboard", Some("session_id=sid")).await;
    assert_redirect(&response);
    assert_eq!(location(&response), "/auth/login");
    assert_cookie_cleared(&set_cookies(&response));
    assert!(app.sessions.load("sid").await.unwrap().is_none());
}

#[tokio::test]
async fn test_forged_access_token_invalidates_session() {
    let app = TestApp::start().await;
    let mut claims = app.provider.access_token_claims(300);
    claims["iss"] = serde_json::json!("https://attacker.example/realms/test");
    app.sessions
        .save("sid", &record(app.provider.sign(&claims)), Duration::from_secs(300))
        .await
        .unwrap();

    let outcome = app.auth.authenticate(Some("sid")).await;
    assert!(matches!(outcome, GateOutcome::Rejected { clear_cookie: true }));
    assert!(app.sessions.is_empty());
}

#[tokio::test]
async fn test_authenticate_outcomes() {
    let app = TestApp::start().await;
    app.sessions
        .save("sid", &record(app.provider.access_token()), Duration::from_secs(300))
        .await
        .unwrap();

    assert!(matches!(
        app.auth.authenticate(None).await,
        GateOutcome::Rejected { clear_cookie: false }
    ));
    assert!(matches!(
        app.auth.authenticate(Some("")).await,
        GateOutcome::Rejected { clear_cookie: false }
    ));

    match app.auth.authenticate(Some("sid")).await {
        GateOutcome::Admitted(context) => {
            assert_eq!(context.session_id, "sid");
            assert_eq!(context.record.profile.display_name, "alice");
            assert_eq!(context.claims.email.as_deref(), Some("a@b.com"));
            assert_eq!(context.claims.scopes, vec!["openid", "profile", "email"]);
            assert_eq!(context.claims.resource_roles["account"], vec!["view-profile"]);
        }
        other => panic!("expected admission, got {:?}", other),
    }
}

/// Session store whose reads always fail
struct UnreachableSessionStore;

#[async_trait]
impl SessionStore for UnreachableSessionStore {
    async fn save(&self, _id: &str, _record: &SessionRecord, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }

    async fn load(&self, _id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }

    async fn invalidate(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_error_is_treated_as_missing_session() {
    let app = TestApp::start().await;
    let auth = AuthState::new(
        app.auth.provider.clone(),
        app.states.clone(),
        Arc::new(UnreachableSessionStore),
        SessionSettings::default(),
    );
    let router = common::app_router(auth);

    let response = tower::ServiceExt::oneshot(
        router,
        axum::http::Request::builder()
            .uri("/dashboard")
            .header("cookie", "session_id=sid")
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    assert_redirect(&response);
    assert_eq!(location(&response), "/auth/login");
    assert_cookie_cleared(&set_cookies(&response));
}

/// Session store holding one record it can never delete
struct UndeletableSessionStore {
    record: SessionRecord,
}

#[async_trait]
impl SessionStore for UndeletableSessionStore {
    async fn save(&self, _id: &str, _record: &SessionRecord, _ttl: Duration) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load(&self, _id: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(Some(self.record.clone()))
    }

    async fn invalidate(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection reset".to_string()))
    }
}

#[tokio::test]
async fn test_rejected_token_stays_rejected_when_invalidate_fails() {
    let app = TestApp::start().await;
    let auth = AuthState::new(
        app.auth.provider.clone(),
        app.states.clone(),
        Arc::new(UndeletableSessionStore {
            record: record(app.provider.expired_access_token()),
        }),
        SessionSettings::default(),
    );

    assert!(matches!(
        auth.authenticate(Some("sid")).await,
        GateOutcome::Rejected { clear_cookie: true }
    ));

    let router = common::app_router(auth);
    for _ in 0..2 {
        let response = tower::ServiceExt::oneshot(
            router.clone(),
            axum::http::Request::builder()
                .uri("/dashboard")
                .header("cookie", "session_id=sid")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_redirect(&response);
        assert_eq!(location(&response), "/auth/login");
        assert_cookie_cleared(&set_cookies(&response));
    }
}

#[tokio::test]
async fn test_logout_ends_session() {
    let app = TestApp::start().await;
    app.sessions
        .save("sid", &record(app.provider.access_token()), Duration::from_secs(300))
        .await
        .unwrap();

    let response = app.get("/auth/logout", Some("session_id=sid")).await;
    assert_redirect(&response);
    assert_eq!(location(&response), "/");
    assert_cookie_cleared(&set_cookies(&response));
    assert!(app.sessions.load("sid").await.unwrap().is_none());

    // Idempotent, and fine without a cookie
    let again = app.get("/auth/logout", Some("session_id=sid")).await;
    assert_redirect(&again);
    let anonymous = app.get("/auth/logout", None).await;
    assert_redirect(&anonymous);

    let after = app.get("/dashboard", Some("session_id=sid")).await;
    assert_eq!(location(&after), "/auth/login");
}

#[tokio::test]
async fn test_extractor_outside_gate_is_internal_error() {
    let app = TestApp::start().await;

    let response = app.get("/unguarded", Some("session_id=sid")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
