//! In-process stores backed by `DashMap`

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{Result, SessionStore, StateStore};
use crate::error::StoreError;
use crate::session::SessionRecord;

fn deadline(ttl: Duration) -> Instant {
    // Saturate absurd TTLs instead of overflowing the clock
    Instant::now()
        .checked_add(ttl)
        .unwrap_or_else(|| Instant::now() + Duration::from_secs(100 * 365 * 24 * 3600))
}

/// Pending login states held in process memory
pub struct MemoryStateStore {
    entries: DashMap<String, Instant>,
    ttl: Duration,
}

impl MemoryStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Number of entries still held, expired or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, expires_at| *expires_at > now);
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, state: &str) -> Result<()> {
        self.purge_expired();

        match self.entries.entry(state.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Command(
                "state already pending".to_string(),
            )),
            Entry::Vacant(slot) => {
                slot.insert(deadline(self.ttl));
                Ok(())
            }
        }
    }

    async fn exists_and_consume(&self, state: &str) -> Result<bool> {
        // remove() is the compare-and-delete: only one caller gets the entry back
        match self.entries.remove(state) {
            Some((_, expires_at)) => Ok(expires_at > Instant::now()),
            None => Ok(false),
        }
    }
}

struct SessionEntry {
    record: SessionRecord,
    expires_at: Instant,
}

/// Session records held in process memory
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, SessionEntry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save(&self, id: &str, record: &SessionRecord, ttl: Duration) -> Result<()> {
        self.purge_expired();
        self.entries.insert(
            id.to_string(),
            SessionEntry {
                record: record.clone(),
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionRecord>> {
        let now = Instant::now();
        let expired = match self.entries.get(id) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.record.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            debug!("Dropping expired session on read");
            self.entries.remove_if(id, |_, entry| entry.expires_at <= now);
        }
        Ok(None)
    }

    async fn invalidate(&self, id: &str) -> Result<()> {
        self.entries.remove(id);
        Ok(())
    }
}
