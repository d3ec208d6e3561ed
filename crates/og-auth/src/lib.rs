//! OIDC Gate authentication core
//!
//! Authorization Code login against an OIDC provider, server-side sessions,
//! and a gate that re-verifies the session's access token on every request.
//!
//! ```text
//! /auth/login ──> provider ──> /auth/callback ──> session cookie ──> require_session ──> handler
//! ```

pub mod cookies;
pub mod error;
pub mod flow;
pub mod gate;
pub mod provider;
pub mod session;
pub mod store;
pub mod token;

pub use error::{AuthError, ProviderError, StoreError, TokenError};
pub use flow::{auth_router, AuthState, CallbackParams, EstablishedSession, FlowStage};
pub use gate::{require_session, Authenticated, GateOutcome};
pub use provider::{
    IdentityProvider, OidcProviderClient, ProviderClaims, ProviderMetadata, ProviderSettings,
    TokenBundle,
};
pub use session::{SessionContext, SessionRecord, SessionSettings, UserProfile};
pub use store::{
    MemorySessionStore, MemoryStateStore, RedisSessionStore, RedisStateStore, RedisStoreConfig,
    SessionStore, StateStore,
};
