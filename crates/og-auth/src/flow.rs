//! Login flow: redirect to the provider, handle the callback, establish a session
//!
//! Stages of one login attempt:
//! `Unauthenticated -> StatePending -> CodeReceived -> TokenExchanged -> ClaimsVerified -> SessionEstablished`.
//! Every failure is terminal for the request. Nothing is retried and a consumed
//! state is never restored.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use og_common::redact;

use crate::cookies::{clear_session_cookie, session_cookie};
use crate::error::AuthError;
use crate::provider::IdentityProvider;
use crate::session::{SessionRecord, SessionSettings, UserProfile};
use crate::store::{SessionStore, StateStore};
use crate::token;

/// Position of a login attempt, used as a log field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    Unauthenticated,
    StatePending,
    CodeReceived,
    TokenExchanged,
    ClaimsVerified,
    SessionEstablished,
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowStage::Unauthenticated => "unauthenticated",
            FlowStage::StatePending => "state_pending",
            FlowStage::CodeReceived => "code_received",
            FlowStage::TokenExchanged => "token_exchanged",
            FlowStage::ClaimsVerified => "claims_verified",
            FlowStage::SessionEstablished => "session_established",
        };
        f.write_str(name)
    }
}

/// Shared state for the login routes and the gate
#[derive(Clone)]
pub struct AuthState {
    pub provider: Arc<dyn IdentityProvider>,
    pub state_store: Arc<dyn StateStore>,
    pub session_store: Arc<dyn SessionStore>,
    pub session: Arc<SessionSettings>,
}

impl AuthState {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        state_store: Arc<dyn StateStore>,
        session_store: Arc<dyn SessionStore>,
        session: SessionSettings,
    ) -> Self {
        Self {
            provider,
            state_store,
            session_store,
            session: Arc::new(session),
        }
    }

    /// Mint and record a state, returning the provider redirect URL
    pub async fn begin_login(&self) -> Result<String, AuthError> {
        let state = token::generate()?;
        self.state_store.put(&state).await?;

        info!(
            stage = %FlowStage::StatePending,
            state = %redact(&state),
            "Login started"
        );
        Ok(self.provider.build_authorization_url(&state))
    }

    /// Validate a provider callback and establish a session
    pub async fn complete_login(&self, params: CallbackParams) -> Result<EstablishedSession, AuthError> {
        let state = params
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::bad_request("callback without state"))?;

        if let Some(error) = params.error {
            self.burn_state(&state).await;
            return Err(AuthError::bad_request(format!(
                "provider returned error '{}': {}",
                error,
                params.error_description.unwrap_or_default()
            )));
        }

        let Some(code) = params.code.filter(|c| !c.is_empty()) else {
            self.burn_state(&state).await;
            return Err(AuthError::bad_request("callback without code"));
        };

        match self.state_store.exists_and_consume(&state).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(AuthError::forbidden(format!(
                    "state {} unknown, expired or already used",
                    redact(&state)
                )));
            }
            Err(e) => {
                return Err(AuthError::forbidden(format!(
                    "state {} could not be validated: {}",
                    redact(&state),
                    e
                )));
            }
        }
        debug!(stage = %FlowStage::CodeReceived, state = %redact(&state), "State consumed");

        let tokens = self
            .provider
            .exchange_code(&code)
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;
        debug!(stage = %FlowStage::TokenExchanged, "Authorization code redeemed");

        let id_token = tokens
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::Exchange("token response without id_token".to_string()))?;

        let claims = self
            .provider
            .verify_id_token(id_token)
            .await
            .map_err(|e| AuthError::Verification(e.to_string()))?;
        debug!(stage = %FlowStage::ClaimsVerified, subject = %claims.subject, "ID token verified");

        let profile = UserProfile::from_claims(&claims);
        let record = SessionRecord {
            access_token: tokens.access_token,
            profile: profile.clone(),
        };

        let session_id = token::generate()?;
        self.session_store
            .save(&session_id, &record, self.session.ttl)
            .await?;

        info!(
            stage = %FlowStage::SessionEstablished,
            subject = %claims.subject,
            user = %profile.display_name,
            session = %redact(&session_id),
            "Login completed"
        );

        Ok(EstablishedSession {
            session_id,
            profile,
        })
    }

    /// Invalidate a session. Unknown identifiers are fine.
    pub async fn end_session(&self, session_id: &str) -> Result<(), AuthError> {
        self.session_store.invalidate(session_id).await?;
        info!(session = %redact(session_id), "Session ended");
        Ok(())
    }

    /// Consume a state on an aborted callback so it cannot be replayed
    async fn burn_state(&self, state: &str) {
        if let Err(e) = self.state_store.exists_and_consume(state).await {
            warn!(state = %redact(state), error = %e, "Failed to discard state of aborted login");
        }
    }
}

/// Query parameters of the provider callback
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A session written to the store by a completed login
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub session_id: String,
    pub profile: UserProfile,
}

/// GET /auth/login
pub async fn login(State(auth): State<AuthState>) -> Result<Redirect, AuthError> {
    let url = auth.begin_login().await?;
    Ok(Redirect::to(&url))
}

/// GET /auth/callback
pub async fn callback(
    State(auth): State<AuthState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), AuthError> {
    let established = auth.complete_login(params).await?;
    let jar = jar.add(session_cookie(&auth.session, established.session_id));
    Ok((jar, Redirect::to(&auth.session.landing_path)))
}

/// GET /auth/logout
pub async fn logout(State(auth): State<AuthState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(&auth.session.cookie_name) {
        if let Err(e) = auth.end_session(cookie.value()).await {
            warn!(error = %e, "Session could not be invalidated on logout");
        }
    }
    (jar.add(clear_session_cookie(&auth.session)), Redirect::to("/"))
}

/// Login routes, meant to be nested under `/auth`
pub fn auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/callback", get(callback))
        .route("/logout", get(logout))
        .with_state(state)
}
