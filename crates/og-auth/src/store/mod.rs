//! State and session stores
//!
//! Both stores are abstract so the flow handler and the gate can run against
//! Redis in production and an in-process map in development and tests.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;
use crate::session::SessionRecord;

mod memory;
mod redis_store;

pub use memory::{MemorySessionStore, MemoryStateStore};
pub use redis_store::{RedisSessionStore, RedisStateStore, RedisStoreConfig};

pub type Result<T> = std::result::Result<T, StoreError>;

/// Short-lived, single-use login state values
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Record a pending state. Never overwrites an existing entry.
    async fn put(&self, state: &str) -> Result<()>;

    /// Atomically check that `state` is pending and remove it.
    ///
    /// At most one caller observes `true` for a given state.
    async fn exists_and_consume(&self, state: &str) -> Result<bool>;

    /// Liveness check for readiness probes
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Time-limited session records keyed by an opaque identifier
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write a record with an absolute lifetime of `ttl`
    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<()>;

    /// Read a record. Reads never extend the lifetime.
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>>;

    /// Remove a record. Succeeds for unknown identifiers.
    async fn invalidate(&self, id: &str) -> Result<()>;

    /// Liveness check for readiness probes
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
