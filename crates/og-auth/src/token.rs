//! Opaque random tokens used for login state values and session identifiers

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::TryRngCore;

use crate::error::TokenError;

/// Bytes of OS randomness per token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe token from the OS CSPRNG.
///
/// The result is 43 characters of unpadded base64url. There is no fallback
/// source: if the OS cannot supply randomness the caller gets an error.
pub fn generate() -> Result<String, TokenError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenError(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
