use chrono::{DateTime, TimeDelta, Utc};
use deferq::Error;
use deferq::cache::{Fetched, TtlCache};
use deferq::clock::ManualClock;
use deferq::memory::{MemoryCache, MemoryTrackerStore};
use deferq::model::{ProviderJobId, Tracker};
use deferq::store::TrackerStore;
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    "2024-06-01T12:00:00Z".parse().unwrap()
}

#[tokio::test]
async fn store_rejects_second_fresh_tracker_for_key() {
    let store = MemoryTrackerStore::new();

    let mut first = Tracker::new("sample_job/1");
    store.save(&mut first).await.unwrap();
    assert!(first.is_persisted());
    assert!(first.updated_at.is_some());

    let mut second = Tracker::new("sample_job/1");
    let err = store.save(&mut second).await.unwrap_err();
    assert!(matches!(err, Error::StoreConflict { key } if key == "sample_job/1"));
    assert!(!second.is_persisted());

    let found = store.find_or_initialize_by_key("sample_job/1").await.unwrap();
    assert_eq!(found.id, first.id);
    let fresh = store.find_or_initialize_by_key("sample_job/2").await.unwrap();
    assert!(!fresh.is_persisted());
}

#[tokio::test]
async fn store_delete_ignores_unsaved_and_stale_trackers() {
    let store = MemoryTrackerStore::new();
    assert!(!store.delete(&Tracker::new("k")).await.unwrap());

    let mut tracker = Tracker::new("k");
    tracker.provider_job_id = Some(ProviderJobId::new("a"));
    store.save(&mut tracker).await.unwrap();

    let mut stale = tracker.clone();
    stale.provider_job_id = Some(ProviderJobId::new("b"));
    assert!(!store.delete(&stale).await.unwrap());
    assert!(store.delete(&tracker).await.unwrap());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn cache_entries_expire_with_the_clock() {
    let clock = Arc::new(ManualClock::new(start()));
    let cache = MemoryCache::with_clock(clock.clone());

    let first = cache
        .fetch_or_compute("k", TimeDelta::seconds(10), || async { Ok("sent") })
        .await
        .unwrap();
    assert_eq!(first, Fetched::Computed("sent"));
    assert_eq!(cache.ttl("k"), Some(TimeDelta::seconds(10)));

    clock.advance(TimeDelta::seconds(9));
    let again = cache
        .fetch_or_compute("k", TimeDelta::seconds(10), || async { Ok("sent") })
        .await
        .unwrap();
    assert_eq!(again, Fetched::Cached);

    clock.advance(TimeDelta::seconds(1));
    assert!(cache.get("k").is_none());
    assert_eq!(cache.prune(), 1);
}

#[tokio::test]
async fn failed_compute_leaves_no_entry() {
    let cache = MemoryCache::new();

    let result = cache
        .fetch_or_compute("k", TimeDelta::minutes(1), || async {
            Err::<(), _>(Error::Submission("down".into()))
        })
        .await;

    assert!(result.is_err());
    assert!(cache.get("k").is_none());
}

#[tokio::test]
async fn write_overwrites_live_entry() {
    let clock = Arc::new(ManualClock::new(start()));
    let cache = MemoryCache::with_clock(clock.clone());

    cache.write("k", "1", TimeDelta::seconds(5)).await.unwrap();
    cache.write("k", "1", TimeDelta::hours(1)).await.unwrap();

    clock.advance(TimeDelta::minutes(10));
    assert_eq!(cache.get("k").as_deref(), Some("1"));
}

#[tokio::test]
async fn unbounded_ttl_saturates_instead_of_overflowing() {
    let clock = Arc::new(ManualClock::new(start()));
    let cache = MemoryCache::with_clock(clock.clone());

    let first = cache
        .fetch_or_compute("k", TimeDelta::MAX, || async { Ok(()) })
        .await
        .unwrap();
    assert_eq!(first, Fetched::Computed(()));

    clock.advance(TimeDelta::weeks(52 * 1000));
    assert_eq!(cache.get("k").as_deref(), Some("1"));
}
