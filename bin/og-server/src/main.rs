//! OIDC Gate Server
//!
//! Keycloak Authorization Code login with server-side sessions:
//! - `/` login page, `/auth/login`, `/auth/callback`, `/auth/logout`
//! - `/dashboard` and `/success-login` behind the session gate
//! - `/health` and `/ready` for probes
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OIDC_GATE_CONFIG` | - | Path to the TOML config file |
//! | `KEYCLOAK_BASE_URL` | - | Keycloak server URL |
//! | `KEYCLOAK_REALM` | - | Realm name |
//! | `KEYCLOAK_CLIENT_ID` | - | Client id |
//! | `KEYCLOAK_CLIENT_SECRET` | - | Client secret |
//! | `KEYCLOAK_REDIRECT_URL` | - | Registered callback URL |
//! | `REDIS_HOST` / `REDIS_PORT` / `REDIS_DATABASE` | `127.0.0.1` / `6379` / `0` | Session store |
//! | `APP_HOST` / `APP_PORT` | `0.0.0.0` / `8080` | Listen address |
//! | `OIDC_GATE_STORE_BACKEND` | `redis` | `redis` or `memory` |
//! | `RUST_LOG` | `info` | Log level |
//! | `LOG_FORMAT` | `text` | `json` for structured output |
//!
//! Every `[section] key` of the config file can also be set as
//! `OIDC_GATE_<SECTION>_<KEY>`.

mod pages;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, signal, sync::oneshot};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use og_auth::{
    auth_router, require_session, AuthState, MemorySessionStore, MemoryStateStore,
    OidcProviderClient, ProviderSettings, RedisSessionStore, RedisStateStore, RedisStoreConfig,
    SessionSettings, SessionStore, StateStore,
};
use og_config::{AppConfig, StoreBackend};

use crate::pages::Pages;

/// How long in-flight requests may run after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    og_common::logging::init_logging("og-server");

    info!("Starting OIDC Gate Server");

    let config = AppConfig::load()?;
    config.validate()?;

    let (state_store, session_store) = build_stores(&config).await?;

    let provider = OidcProviderClient::discover(provider_settings(&config)).await?;
    let auth = AuthState::new(
        Arc::new(provider),
        state_store,
        session_store,
        session_settings(&config),
    );
    let pages = Arc::new(Pages::new()?);

    let app = build_router(
        auth,
        pages,
        Duration::from_secs(config.http.request_timeout_secs),
    );

    let addr = config.http.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "HTTP server listening");

    let (drain_tx, drain_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Shutdown signal received, draining connections");
    let _ = drain_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => info!("OIDC Gate Server stopped"),
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Drain window elapsed with requests still in flight"
        ),
    }

    Ok(())
}

async fn build_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn StateStore>, Arc<dyn SessionStore>)> {
    let state_ttl = Duration::from_secs(config.store.state_ttl_secs);

    match config.store.backend {
        StoreBackend::Redis => {
            let redis_config = RedisStoreConfig {
                url: config.redis.url.clone(),
                key_prefix: config.store.key_prefix.clone(),
                connection_timeout: Duration::from_millis(config.redis.connection_timeout_ms),
                response_timeout: Duration::from_millis(config.redis.response_timeout_ms),
            };
            let conn = redis_config.connect().await?;
            let states: Arc<dyn StateStore> = Arc::new(RedisStateStore::new(
                conn.clone(),
                &redis_config.key_prefix,
                state_ttl,
            ));
            let sessions: Arc<dyn SessionStore> =
                Arc::new(RedisSessionStore::new(conn, &redis_config.key_prefix));
            Ok((states, sessions))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores; sessions are lost on restart and not shared between instances");
            let states: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new(state_ttl));
            let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
            Ok((states, sessions))
        }
    }
}

fn provider_settings(config: &AppConfig) -> ProviderSettings {
    let provider = &config.provider;
    ProviderSettings {
        base_url: provider.base_url.clone(),
        realm: provider.realm.clone(),
        client_id: provider.client_id.clone(),
        client_secret: provider.client_secret.clone(),
        redirect_url: provider.redirect_url.clone(),
        scopes: provider.scopes.clone(),
        request_timeout: Duration::from_secs(provider.request_timeout_secs),
        jwks_cache_ttl: Duration::from_secs(provider.jwks_cache_ttl_secs),
        jwks_min_refetch_interval: Duration::from_secs(provider.jwks_min_refetch_secs),
    }
}

fn session_settings(config: &AppConfig) -> SessionSettings {
    let session = &config.session;
    SessionSettings {
        cookie_name: session.cookie_name.clone(),
        ttl: Duration::from_secs(session.ttl_secs),
        secure: session.secure,
        login_path: session.login_path.clone(),
        landing_path: session.landing_path.clone(),
    }
}

fn build_router(auth: AuthState, pages: Arc<Pages>, request_timeout: Duration) -> Router {
    let protected = Router::new()
        .route("/dashboard", get(pages::dashboard))
        .route("/success-login", get(pages::dashboard))
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_session))
        .with_state(pages.clone());

    let public = Router::new()
        .route("/", get(pages::login_page))
        .with_state(pages);

    let probes = Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .with_state(auth.clone());

    Router::new()
        .nest("/auth", auth_router(auth))
        .merge(public)
        .merge(protected)
        .merge(probes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "UP",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn ready_handler(State(auth): State<AuthState>) -> impl IntoResponse {
    let states = auth.state_store.ping().await;
    let sessions = auth.session_store.ping().await;

    match states.and(sessions) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "READY" })),
        ),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "NOT_READY" })),
            )
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
