//! TTL cache with per-key atomic fetch-or-compute.
//!
//! Each key gets its own async mutex, held across the computation, so
//! concurrent callers for one key serialize while other keys proceed.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::cache::{Fetched, SENTINEL, TtlCache};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Expire entries against `clock` instead of the wall clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Live value for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.live(key).map(|entry| entry.value)
    }

    /// Remaining lifetime of the live entry for `key`.
    pub fn ttl(&self, key: &str) -> Option<TimeDelta> {
        self.live(key)
            .map(|entry| entry.expires_at - self.clock.now())
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .cloned()
    }

    fn put(&self, key: &str, value: &str, ttl: TimeDelta) {
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = Entry {
            value: value.to_string(),
            expires_at,
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    fn release_key_lock(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }
}

impl TtlCache for MemoryCache {
    async fn fetch_or_compute<T, F, Fut>(
        &self,
        key: &str,
        ttl: TimeDelta,
        compute: F,
    ) -> Result<Fetched<T>>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let lock = self.key_lock(key);
        let outcome = {
            let _guard = lock.lock().await;
            if self.live(key).is_some() {
                Ok(Fetched::Cached)
            } else {
                match compute().await {
                    Ok(value) => {
                        self.put(key, SENTINEL, ttl);
                        Ok(Fetched::Computed(value))
                    }
                    Err(e) => Err(e),
                }
            }
        };
        drop(lock);
        self.release_key_lock(key);
        outcome
    }

    async fn write(&self, key: &str, value: &str, ttl: TimeDelta) -> Result<()> {
        self.put(key, value, ttl);
        Ok(())
    }
}
