//! Redis-backed stores
//!
//! - SET NX PX for pending states, so a state is never overwritten
//! - Lua compare-and-delete for consumption, so only one callback wins
//! - SET PX with a JSON payload for sessions, absolute expiry from creation

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;
use tracing::{debug, info};

use super::{Result, SessionStore, StateStore};
use crate::error::StoreError;
use crate::session::SessionRecord;

const CONSUME_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        redis.call("DEL", KEYS[1])
        return 1
    else
        return 0
    end
"#;

/// Connection settings shared by both Redis stores
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Prefix for every key, e.g. `og` gives `og:state:<value>`
    pub key_prefix: String,
    pub connection_timeout: Duration,
    pub response_timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            key_prefix: "og".to_string(),
            connection_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(1),
        }
    }
}

impl RedisStoreConfig {
    /// Open a managed connection that reconnects on failure
    pub async fn connect(&self) -> Result<ConnectionManager> {
        let client = redis::Client::open(self.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(self.connection_timeout)
            .set_response_timeout(self.response_timeout);

        let conn = ConnectionManager::new_with_config(client, manager_config).await?;
        info!(key_prefix = %self.key_prefix, "Connected to Redis");
        Ok(conn)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

async fn ping(conn: &ConnectionManager) -> Result<()> {
    let mut conn = conn.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

/// Pending login states stored in Redis
#[derive(Clone)]
pub struct RedisStateStore {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
}

impl RedisStateStore {
    pub fn new(conn: ConnectionManager, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    fn key(&self, state: &str) -> String {
        format!("{}:state:{}", self.key_prefix, state)
    }
}

#[async_trait]
impl StateStore for RedisStateStore {
    async fn put(&self, state: &str) -> Result<()> {
        let mut conn = self.conn.clone();

        let result: Option<String> = redis::cmd("SET")
            .arg(self.key(state))
            .arg(state)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(self.ttl))
            .query_async(&mut conn)
            .await?;

        match result {
            Some(_) => Ok(()),
            None => Err(StoreError::Command("state already pending".to_string())),
        }
    }

    async fn exists_and_consume(&self, state: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let result: i32 = redis::Script::new(CONSUME_SCRIPT)
            .key(self.key(state))
            .arg(state)
            .invoke_async(&mut conn)
            .await?;

        debug!(consumed = result == 1, "State consumption attempted");
        Ok(result == 1)
    }

    async fn ping(&self) -> Result<()> {
        ping(&self.conn).await
    }
}

/// Session records stored in Redis as JSON
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
        }
    }

    fn key(&self, id: &str) -> String {
        format!("{}:session:{}", self.key_prefix, id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;

        let _: () = redis::cmd("SET")
            .arg(self.key(id))
            .arg(payload)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        let mut conn = self.conn.clone();

        let payload: Option<String> = redis::cmd("GET")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await?;

        payload
            .map(|p| serde_json::from_str::<SessionRecord>(&p))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn invalidate(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        ping(&self.conn).await
    }
}
