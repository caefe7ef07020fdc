//! Tracker store interface.
//!
//! The store is shared state across processes. Key is a uniqueness
//! constraint at this layer: inserting a second tracker for a key fails with
//! [`Error::StoreConflict`](crate::error::Error::StoreConflict).

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::model::Tracker;

pub trait TrackerStore: Send + Sync {
    /// The persisted tracker for `key`, if any.
    fn find_by_key(&self, key: &str) -> impl Future<Output = Result<Option<Tracker>>> + Send;

    /// The persisted tracker for `key`, or an unsaved one.
    fn find_or_initialize_by_key(&self, key: &str) -> impl Future<Output = Result<Tracker>> + Send {
        async move {
            Ok(self
                .find_by_key(key)
                .await?
                .unwrap_or_else(|| Tracker::new(key)))
        }
    }

    /// Insert an unsaved tracker or update a persisted one. Assigns `id`
    /// and `updated_at` on success.
    fn save(&self, tracker: &mut Tracker) -> impl Future<Output = Result<()>> + Send;

    /// Remove `tracker` if its row still names the same provider job.
    /// Returns whether a row was removed.
    fn delete(&self, tracker: &Tracker) -> impl Future<Output = Result<bool>> + Send;
}

impl<S: TrackerStore> TrackerStore for Arc<S> {
    fn find_by_key(&self, key: &str) -> impl Future<Output = Result<Option<Tracker>>> + Send {
        (**self).find_by_key(key)
    }

    fn find_or_initialize_by_key(&self, key: &str) -> impl Future<Output = Result<Tracker>> + Send {
        (**self).find_or_initialize_by_key(key)
    }

    fn save(&self, tracker: &mut Tracker) -> impl Future<Output = Result<()>> + Send {
        (**self).save(tracker)
    }

    fn delete(&self, tracker: &Tracker) -> impl Future<Output = Result<bool>> + Send {
        (**self).delete(tracker)
    }
}
