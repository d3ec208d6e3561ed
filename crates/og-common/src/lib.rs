//! OIDC Gate Common
//!
//! Pieces shared by every crate in the workspace: logging bootstrap and
//! helpers for putting secrets near a log line without leaking them.

pub mod logging;

/// Number of leading characters kept by [`redact`].
const REDACT_PREFIX_LEN: usize = 6;

/// Shorten an opaque credential (state, session id, token) for logging.
///
/// Keeps a short prefix so two log lines about the same value can be
/// correlated, and drops the rest. Values no longer than the prefix are
/// returned as is.
pub fn redact(value: &str) -> String {
    if value.is_empty() {
        return "<empty>".to_string();
    }
    if value.chars().count() <= REDACT_PREFIX_LEN {
        return value.to_string();
    }
    let prefix: String = value.chars().take(REDACT_PREFIX_LEN).collect();
    format!("{}…", prefix)
}
