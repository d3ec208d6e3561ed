//! Session cookie construction

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration as CookieDuration;

use crate::session::SessionSettings;

/// Cookie carrying a freshly issued session identifier
pub fn session_cookie(settings: &SessionSettings, session_id: String) -> Cookie<'static> {
    let max_age = i64::try_from(settings.ttl.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((settings.cookie_name.clone(), session_id))
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::seconds(max_age))
        .build()
}

/// Cookie that makes the browser drop the session cookie
pub fn clear_session_cookie(settings: &SessionSettings) -> Cookie<'static> {
    Cookie::build((settings.cookie_name.clone(), ""))
        .path("/")
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Strict)
        .max_age(CookieDuration::ZERO)
        .build()
}
