//! Tracker store held in a map keyed by tracker key.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{Tracker, TrackerId};
use crate::store::TrackerStore;

#[derive(Debug, Default)]
pub struct MemoryTrackerStore {
    rows: RwLock<HashMap<String, Tracker>>,
    writes: AtomicUsize,
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves and deletes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    /// All persisted trackers, ordered by key.
    pub async fn list(&self) -> Vec<Tracker> {
        let rows = self.rows.read().await;
        let mut all: Vec<Tracker> = rows.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

impl TrackerStore for MemoryTrackerStore {
    async fn find_by_key(&self, key: &str) -> Result<Option<Tracker>> {
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn save(&self, tracker: &mut Tracker) -> Result<()> {
        let mut rows = self.rows.write().await;

        if let Some(existing) = rows.get(&tracker.key) {
            if tracker.id.is_none() || existing.id != tracker.id {
                return Err(Error::StoreConflict {
                    key: tracker.key.clone(),
                });
            }
        }

        tracker.id.get_or_insert_with(TrackerId::new);
        tracker.updated_at = Some(Utc::now());
        rows.insert(tracker.key.clone(), tracker.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, tracker: &Tracker) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let matches = rows.get(&tracker.key).is_some_and(|row| {
            row.id == tracker.id && row.provider_job_id == tracker.provider_job_id
        });
        if matches {
            rows.remove(&tracker.key);
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(matches)
    }
}
