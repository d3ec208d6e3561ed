//! Error types for the login flow, the identity provider and the stores

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Failures reported by a state or session store backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store command failed: {0}")]
    Command(String),

    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_timeout() || err.is_connection_dropped() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Failures talking to the identity provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider discovery failed: {0}")]
    Discovery(String),

    #[error("Code exchange failed: {0}")]
    Exchange(String),

    #[error("Token verification failed: {0}")]
    Verification(String),
}

/// Failure to obtain randomness from the operating system
#[derive(Error, Debug)]
#[error("Random token generation failed: {0}")]
pub struct TokenError(pub String);

/// Terminal outcome of a login-flow request.
///
/// The browser only ever sees a generic message; the detail carried by each
/// variant is written to the log when the response is built.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Code exchange failed: {0}")]
    Exchange(String),

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::Exchange(_) => StatusCode::BAD_GATEWAY,
            AuthError::Verification(_) => StatusCode::UNAUTHORIZED,
            AuthError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AuthError::BadRequest(_) => "BAD_REQUEST",
            AuthError::Forbidden(_) => "FORBIDDEN",
            AuthError::Exchange(_) => "EXCHANGE_ERROR",
            AuthError::Verification(_) => "VERIFICATION_ERROR",
            AuthError::Store(_) => "STORE_ERROR",
            AuthError::NotFound(_) => "NOT_FOUND",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Login request failed");
        } else {
            warn!(code = self.code(), error = %self, "Login request rejected");
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            message: "Authentication failed. Please try signing in again.".to_string(),
        };

        (status, Json(body)).into_response()
    }
}
