//! Request authentication gate
//!
//! Resolves the session named by the cookie, re-verifies its access token with
//! the provider on every request, and either admits the request with a typed
//! [`SessionContext`] in its extensions or redirects to the login page.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, warn};

use og_common::redact;

use crate::cookies::clear_session_cookie;
use crate::error::AuthError;
use crate::flow::AuthState;
use crate::session::SessionContext;

/// Result of checking one request
#[derive(Debug)]
pub enum GateOutcome {
    Admitted(SessionContext),
    /// Not admitted. `clear_cookie` is set when the browser holds a stale cookie.
    Rejected { clear_cookie: bool },
}

impl AuthState {
    /// Decide whether a request carrying `session_id` is authenticated.
    ///
    /// A failed access-token check invalidates the session. Store read errors
    /// are treated as a missing session.
    pub async fn authenticate(&self, session_id: Option<&str>) -> GateOutcome {
        let Some(id) = session_id.filter(|s| !s.is_empty()) else {
            return GateOutcome::Rejected {
                clear_cookie: false,
            };
        };

        let record = match self.session_store.load(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(session = %redact(id), "Session not found or expired");
                return GateOutcome::Rejected { clear_cookie: true };
            }
            Err(e) => {
                warn!(session = %redact(id), error = %e, "Session lookup failed, treating as missing");
                return GateOutcome::Rejected { clear_cookie: true };
            }
        };

        match self.provider.verify_access_token(&record.access_token).await {
            Ok(claims) => GateOutcome::Admitted(SessionContext {
                session_id: id.to_string(),
                record,
                claims,
            }),
            Err(e) => {
                warn!(session = %redact(id), error = %e, "Access token rejected, ending session");
                if let Err(e) = self.session_store.invalidate(id).await {
                    warn!(session = %redact(id), error = %e, "Failed to invalidate rejected session");
                }
                GateOutcome::Rejected { clear_cookie: true }
            }
        }
    }
}

/// Middleware for protected routes.
///
/// Use with `axum::middleware::from_fn_with_state(auth_state, require_session)`.
pub async fn require_session(
    State(auth): State<AuthState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session_id = jar
        .get(&auth.session.cookie_name)
        .map(|cookie| cookie.value().to_string());

    match auth.authenticate(session_id.as_deref()).await {
        GateOutcome::Admitted(context) => {
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        GateOutcome::Rejected { clear_cookie } => {
            let redirect = Redirect::to(&auth.session.login_path);
            if clear_cookie {
                (jar.add(clear_session_cookie(&auth.session)), redirect).into_response()
            } else {
                redirect.into_response()
            }
        }
    }
}

/// Extractor for the session admitted by [`require_session`]
pub struct Authenticated(pub SessionContext);

impl std::ops::Deref for Authenticated {
    type Target = SessionContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| AuthError::internal("route is not behind the session gate"))
    }
}
