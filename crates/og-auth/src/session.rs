//! Session records and the settings that shape the session cookie

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::provider::ProviderClaims;

/// Minimal user profile kept alongside the access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl UserProfile {
    /// Build a profile from verified ID token claims.
    ///
    /// Display name prefers `preferred_username`, then `name`, then the email,
    /// and finally the subject so it is never empty.
    pub fn from_claims(claims: &ProviderClaims) -> Self {
        let display_name = claims
            .preferred_username
            .clone()
            .or_else(|| claims.name.clone())
            .or_else(|| claims.email.clone())
            .unwrap_or_else(|| claims.subject.clone());

        Self {
            display_name,
            email: claims.email.clone(),
        }
    }
}

/// Server-side session, stored as JSON under the session identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    pub profile: UserProfile,
}

/// Session cookie and lifetime settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    /// Absolute lifetime of a session, also used as the cookie Max-Age
    pub ttl: Duration,
    pub secure: bool,
    pub login_path: String,
    pub landing_path: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "session_id".to_string(),
            ttl: Duration::from_secs(300),
            secure: true,
            login_path: "/auth/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

/// Verified identity attached to a request admitted by the gate
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub record: SessionRecord,
    /// Claims from the access token verified for this request
    pub claims: ProviderClaims,
}
